//! Entity id allocation (spec §3 "Entity"; invariant 8).
//!
//! Unlike a generation-counted allocator that recycles freed ids, this allocator never reissues
//! an id within the lifetime of a registry: `EntityId`s only increase until [`Allocator::clear`]
//! resets the whole registry back to empty (spec invariant 8: "entity ids are never reused
//! within a registry's lifetime, even across destroy/create pairs"). Freed *slots* in the
//! `alive` bitset are reclaimed immediately; the id counter itself is monotonic.

use fixedbitset::FixedBitSet;

use crate::error::RegistryError;
use crate::id::EntityId;

/// Tracks which entity ids exist and vends new ones.
#[derive(Debug, Default)]
pub struct Allocator {
    next: u32,
    alive: FixedBitSet,
    count: usize,
}

impl Allocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh, never-before-used id.
    pub fn create(&mut self) -> EntityId {
        let id = EntityId::new(self.next);
        self.next += 1;
        self.mark_alive(id);
        id
    }

    /// Mark a caller-supplied id as alive, advancing the allocator past it so future `create`
    /// calls never collide with ids injected from outside (spec §4.4 `generate`/action payload
    /// entities, which may name ids ahead of the allocator's own cursor).
    pub fn ensure(&mut self, id: EntityId) {
        if id.index() as u32 >= self.next {
            self.next = id.index() as u32 + 1;
        }
        self.mark_alive(id);
    }

    fn mark_alive(&mut self, id: EntityId) {
        let index = id.index();
        if index >= self.alive.len() {
            self.alive.grow(index + 1);
        }
        if !self.alive.contains(index) {
            self.alive.insert(index);
            self.count += 1;
        }
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.alive.contains(id.index())
    }

    pub fn destroy(&mut self, id: EntityId) -> Result<(), RegistryError> {
        if !self.exists(id) {
            return Err(RegistryError::UnknownEntity(id));
        }
        self.alive.set(id.index(), false);
        self.count -= 1;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Every live entity id, in ascending order. Ascending-by-id order gives the view builder a
    /// deterministic fallback iteration order when no include-filter storage bounds the
    /// candidate set (spec §5: "entity visitation order is stable across runs given identical
    /// inputs").
    pub fn iter_alive(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.alive.ones().map(|index| EntityId::new(index as u32))
    }

    /// Reset the allocator to empty, including the id counter (spec §4.1 `clear_registry`: the
    /// only point at which ids may be reused).
    pub fn clear(&mut self) {
        self.next = 0;
        self.alive.clear();
        self.count = 0;
    }
}
