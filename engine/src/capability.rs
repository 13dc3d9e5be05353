//! A system's declared capability table over component types (spec §3, §4.3, §4.4).
//!
//! This is the generalization of a simple read/write access-conflict model into the full
//! capability lattice this runtime needs: plain read/write, filter-only membership, and the
//! two mutating capabilities (`Adds`, `Removes`) that imply their own filter behavior.

use fixedbitset::FixedBitSet;

use crate::id::ComponentId;

/// One capability a system declares with respect to a single component type.
///
/// `Optional` access does not participate in the view's include filter (spec §4.3): an
/// `Optional` capability only grants the *right* to call `get`/`update`/`has`, conditioned on
/// `has` returning true first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Read-only access. Participates in the include filter unless `optional`.
    Readonly { optional: bool },
    /// Write-only access (no read). Participates in the include filter unless `optional`.
    Writeonly { optional: bool },
    /// Read and write access. Participates in the include filter unless `optional`.
    Readwrite { optional: bool },
    /// Filter-only: entity must have this component, the system never reads or writes it.
    Include,
    /// Filter-only: entity must NOT have this component.
    Exclude,
    /// The system may create new instances of this component on entities; implies `Exclude`
    /// (spec §3: "you cannot add what is already there").
    Adds,
    /// The system may remove this component from entities; implies `Include` (spec §3: "you
    /// cannot remove what is absent").
    Removes,
}

impl Capability {
    #[inline]
    pub fn is_optional(&self) -> bool {
        matches!(
            self,
            Capability::Readonly { optional: true }
                | Capability::Writeonly { optional: true }
                | Capability::Readwrite { optional: true }
        )
    }

    #[inline]
    pub fn can_read(&self) -> bool {
        matches!(
            self,
            Capability::Readonly { .. } | Capability::Readwrite { .. }
        )
    }

    #[inline]
    pub fn can_write(&self) -> bool {
        matches!(
            self,
            Capability::Writeonly { .. } | Capability::Readwrite { .. }
        )
    }

    #[inline]
    pub fn can_add(&self) -> bool {
        matches!(self, Capability::Adds)
    }

    #[inline]
    pub fn can_remove(&self) -> bool {
        matches!(self, Capability::Removes)
    }

    /// Whether this capability requires the entity to have the component for the view's
    /// include filter (spec §4.3: required/optional reads+writes, plain `Include`, and
    /// `Removes` via its implied `Include`).
    #[inline]
    pub fn requires_presence(&self) -> bool {
        match self {
            Capability::Readonly { optional } | Capability::Writeonly { optional } | Capability::Readwrite { optional } => {
                !optional
            }
            Capability::Include | Capability::Removes => true,
            Capability::Exclude | Capability::Adds => false,
        }
    }

    /// Whether this capability requires the entity to NOT have the component (plain
    /// `Exclude`, and `Adds` via its implied `Exclude`).
    #[inline]
    pub fn requires_absence(&self) -> bool {
        matches!(self, Capability::Exclude | Capability::Adds)
    }
}

/// A system's full capability declaration: one [`Capability`] per [`ComponentId`] it touches.
///
/// Kept as a sorted `Vec` (systems rarely declare more than a handful of components) plus two
/// [`FixedBitSet`]s that mirror the include/exclude filter for O(1) membership checks in the
/// view builder's hot loop — the same bitset-membership technique this codebase already uses
/// for access-conflict detection, repointed at filter membership instead.
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    entries: Vec<(ComponentId, Capability)>,
    include_mask: FixedBitSet,
    exclude_mask: FixedBitSet,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a capability for `component`. Declaring the same component twice replaces the
    /// prior entry — this is a construction-time API, not used during a tick.
    pub fn declare(&mut self, component: ComponentId, capability: Capability) -> &mut Self {
        let index = component.index();
        if capability.requires_presence() {
            self.include_mask.grow(index + 1);
            self.include_mask.insert(index);
            self.exclude_mask.grow(index + 1);
            self.exclude_mask.set(index, false);
        } else if capability.requires_absence() {
            self.exclude_mask.grow(index + 1);
            self.exclude_mask.insert(index);
            self.include_mask.grow(index + 1);
            self.include_mask.set(index, false);
        }

        if let Some(slot) = self.entries.iter_mut().find(|(c, _)| *c == component) {
            slot.1 = capability;
        } else {
            self.entries.push((component, capability));
        }
        self
    }

    /// Look up the declared capability for a component, if any.
    pub fn get(&self, component: ComponentId) -> Option<Capability> {
        self.entries
            .iter()
            .find(|(c, _)| *c == component)
            .map(|(_, cap)| *cap)
    }

    /// All (component, capability) entries, in declaration order.
    pub fn entries(&self) -> &[(ComponentId, Capability)] {
        &self.entries
    }

    /// Components that must be present on an entity for it to be included in the view.
    pub fn include_mask(&self) -> &FixedBitSet {
        &self.include_mask
    }

    /// Components that must be absent from an entity for it to be included in the view.
    pub fn exclude_mask(&self) -> &FixedBitSet {
        &self.exclude_mask
    }

    /// Components this system may write to via `update`/`add`/`remove` (used to decide which
    /// `BeforeChange<C>` storages the view needs to attach, spec §4.3).
    pub fn writable_components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.entries
            .iter()
            .filter(|(_, cap)| cap.can_write())
            .map(|(c, _)| *c)
    }

    /// Whether this system declares any `Adds`/`Removes` (spec §4.5 parallel eligibility: "no
    /// adds, no removes, no generates, no children"). `Readwrite`/`Writeonly` are deliberately
    /// excluded here — each entity owns disjoint storage slots, so concurrent `update` across
    /// different entities of the same component is sound, and §8 scenario S5 exercises exactly
    /// this (a parallel system declaring `Readwrite Position`).
    pub fn has_mutating_capability(&self) -> bool {
        self.entries.iter().any(|(_, cap)| cap.can_add() || cap.can_remove())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readonly_required_marks_include_mask() {
        // Given
        let mut table = CapabilityTable::new();
        let position = ComponentId::new(0);
        // When
        table.declare(position, Capability::Readonly { optional: false });
        // Then
        assert!(table.include_mask().contains(position.index()));
        assert!(!table.exclude_mask().contains(position.index()));
    }

    #[test]
    fn optional_readonly_does_not_mark_include_mask() {
        // Given
        let mut table = CapabilityTable::new();
        let velocity = ComponentId::new(1);
        // When
        table.declare(velocity, Capability::Readonly { optional: true });
        // Then
        assert!(!table.include_mask().contains(velocity.index()));
    }

    #[test]
    fn adds_marks_exclude_mask() {
        // Given
        let mut table = CapabilityTable::new();
        let tag = ComponentId::new(2);
        // When
        table.declare(tag, Capability::Adds);
        // Then
        assert!(table.exclude_mask().contains(tag.index()));
        assert!(table.get(tag).unwrap().can_add());
    }

    #[test]
    fn removes_marks_include_mask() {
        // Given
        let mut table = CapabilityTable::new();
        let tag = ComponentId::new(3);
        // When
        table.declare(tag, Capability::Removes);
        // Then
        assert!(table.include_mask().contains(tag.index()));
    }

    #[test]
    fn has_mutating_capability_ignores_plain_readwrite() {
        // Given
        let mut table = CapabilityTable::new();
        table.declare(ComponentId::new(0), Capability::Readonly { optional: false });
        table.declare(ComponentId::new(1), Capability::Readwrite { optional: false });

        // Then: Readwrite alone doesn't disqualify a system from parallel eligibility —
        // disjoint entities own disjoint storage slots.
        assert!(!table.has_mutating_capability());
    }

    #[test]
    fn has_mutating_capability_detects_adds_and_removes() {
        // Given
        let mut table = CapabilityTable::new();
        assert!(!table.has_mutating_capability());

        // When
        table.declare(ComponentId::new(2), Capability::Adds);

        // Then
        assert!(table.has_mutating_capability());
    }
}
