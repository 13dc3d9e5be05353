//! View builder (spec §4.3): turns a system's [`CapabilityTable`] into the ordered list of
//! entities it should iterate for one tick.
//!
//! Grounded in the same bitset-membership technique [`CapabilityTable`] already borrows from
//! the teacher's hierarchical access-request model, applied here to view-candidate filtering
//! instead of access-conflict detection.

use crate::capability::CapabilityTable;
use crate::id::{ComponentId, EntityId};
use crate::registry::Registry;

/// The ordered set of entities a system should run over for one tick.
pub struct View {
    entities: Vec<EntityId>,
}

impl View {
    /// Build a view over `registry` for a system's declared `capabilities`.
    ///
    /// Candidates come from the shortest storage among the include-filter components (spec
    /// §4.3 "the view iterates in the insertion order of the shortest participating storage"),
    /// or every live entity when the capability table declares no include-filter component at
    /// all (only `Exclude`/`Adds`/optional reads, say).
    pub fn build(registry: &Registry, capabilities: &CapabilityTable) -> Self {
        let includes: Vec<ComponentId> = capabilities
            .include_mask()
            .ones()
            .map(|i| ComponentId::new(i as u32))
            .collect();
        let excludes: Vec<ComponentId> = capabilities
            .exclude_mask()
            .ones()
            .map(|i| ComponentId::new(i as u32))
            .collect();

        let shortest = includes
            .iter()
            .copied()
            .filter_map(|c| registry.live_storage(c).map(|s| (c, s.len_erased())))
            .min_by_key(|(_, len)| *len);

        let entities = match shortest {
            Some((shortest_component, _)) => registry
                .live_storage(shortest_component)
                .map(|s| {
                    let mut candidates = Vec::with_capacity(s.len_erased());
                    s.each_erased(&mut |entity, _| candidates.push(entity));
                    candidates
                })
                .unwrap_or_default(),
            None => registry.entities().collect(),
        };

        let entities = entities
            .into_iter()
            .filter(|&entity| {
                includes.iter().all(|&c| registry.has_component(entity, c))
                    && excludes.iter().all(|&c| !registry.has_component(entity, c))
            })
            .collect();

        Self { entities }
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
