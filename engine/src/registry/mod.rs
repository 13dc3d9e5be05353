//! The registry is the central container for entities and their components (spec §3, §4.1).
//!
//! A `Registry` owns entity liveness, one [`ErasedStorage`] per registered component, and the
//! marker storages the event tracker and scheduler need to stage and observe mutations within a
//! tick. Each registered component gets one [`ComponentSlot`] grouping its live storage together
//! with the bookkeeping storages described in spec §3 "Marker storages".

use std::sync::Mutex;

use log::warn;

use crate::component::{ComponentDesc, ComponentRegistry};
use crate::entity::Allocator;
use crate::error::RegistryError;
use crate::id::{ComponentId, EntityId};
use crate::storage::erased::{downcast, downcast_mut};
use crate::storage::{ErasedStorage, SparseSet};

/// Everything the registry tracks for one registered component type.
struct ComponentSlot {
    /// The component's current values, keyed by owning entity.
    live: Box<dyn ErasedStorage>,
    /// `Added<C>`: entities that received this component during the current tick.
    added: SparseSet<()>,
    /// `Changed<C>`: entities whose component was updated and differed from its pre-tick value.
    changed: SparseSet<()>,
    /// `Removed<C>`: entities whose component was removed during the current tick.
    removed: SparseSet<()>,
    /// `BeforeChange<C>`: the value an entity's component held before this tick's first write.
    before_change: Box<dyn ErasedStorage>,
    /// `TempStorage<C>`: the value an entity's component held just before removal.
    temp_storage: Box<dyn ErasedStorage>,
    /// `PendingAdd<C>`: values staged by a system body, not yet visible in `live`.
    pending_add: Box<dyn ErasedStorage>,
    /// `PendingRemove<C>`: entities staged for removal, not yet removed from `live`.
    pending_remove: SparseSet<()>,
}

impl ComponentSlot {
    fn new(desc: &ComponentDesc) -> Self {
        Self {
            live: desc.new_storage(),
            added: SparseSet::new(),
            changed: SparseSet::new(),
            removed: SparseSet::new(),
            before_change: desc.new_storage(),
            temp_storage: desc.new_storage(),
            pending_add: desc.new_storage(),
            pending_remove: SparseSet::new(),
        }
    }

    fn clear_markers(&mut self) {
        self.added.clear();
        self.changed.clear();
        self.removed.clear();
        self.before_change.clear_erased();
        self.temp_storage.clear_erased();
    }
}

/// The central owner of entities and components for one simulation.
pub struct Registry {
    name: Option<String>,
    entities: Allocator,
    components: ComponentRegistry,
    slots: Vec<Option<ComponentSlot>>,
    /// Guards entity-allocation critical sections during system execution (spec §5, §9):
    /// `generate` calls from concurrent contexts serialize through this.
    creation_lock: Mutex<()>,
}

impl Registry {
    pub fn new(name: Option<&str>) -> Self {
        Self {
            name: name.map(str::to_owned),
            entities: Allocator::new(),
            components: ComponentRegistry::new(),
            slots: Vec::new(),
            creation_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    // ---- component registration -------------------------------------------------------

    /// Register a component type. Must happen before any entity uses it (spec §10.3:
    /// configuration is construction-time only).
    pub fn register_component(&mut self, desc: ComponentDesc) {
        let index = desc.id().index();
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(ComponentSlot::new(&desc));
        self.components.register(desc);
    }

    pub fn is_component_registered(&self, component: ComponentId) -> bool {
        self.components.is_registered(component)
    }

    pub fn component_desc(&self, component: ComponentId) -> Option<&ComponentDesc> {
        self.components.get(component)
    }

    pub fn component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.components.ids()
    }

    // ---- entity lifecycle ---------------------------------------------------------------

    pub fn create_entity(&mut self) -> EntityId {
        let _guard = self.creation_lock.lock().expect("creation lock poisoned");
        self.entities.create()
    }

    /// Mark a caller-supplied id as alive, advancing the allocator past it (spec §3: "filling
    /// the gap if a reserved id was pre-injected").
    pub fn ensure_entity(&mut self, id: EntityId) {
        let _guard = self.creation_lock.lock().expect("creation lock poisoned");
        self.entities.ensure(id);
    }

    pub fn entity_exists(&self, id: EntityId) -> bool {
        self.entities.exists(id)
    }

    pub fn count_entities(&self) -> usize {
        self.entities.count()
    }

    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter_alive()
    }

    /// Destroy an entity, removing it from every component storage it participates in.
    pub fn destroy_entity(&mut self, id: EntityId) -> Result<(), RegistryError> {
        self.entities.destroy(id)?;
        for slot in self.slots.iter_mut().flatten() {
            slot.live.remove_erased(id);
            slot.added.remove(id);
            slot.changed.remove(id);
            slot.removed.remove(id);
            slot.before_change.remove_erased(id);
            slot.temp_storage.remove_erased(id);
            slot.pending_add.remove_erased(id);
            slot.pending_remove.remove(id);
        }
        Ok(())
    }

    /// Reset the registry to empty: every entity, every storage, and the id allocator itself
    /// (spec §4.1 `clear_registry`, invariant 8).
    pub fn clear(&mut self) {
        self.entities.clear();
        for slot in self.slots.iter_mut().flatten() {
            slot.live.clear_erased();
            slot.clear_markers();
            slot.pending_add.clear_erased();
            slot.pending_remove.clear();
        }
    }

    // ---- component CRUD (spec §4.1) ------------------------------------------------------

    fn slot(&self, component: ComponentId) -> Option<&ComponentSlot> {
        self.slots.get(component.index()).and_then(|s| s.as_ref())
    }

    fn slot_mut(&mut self, component: ComponentId) -> Option<&mut ComponentSlot> {
        self.slots.get_mut(component.index()).and_then(|s| s.as_mut())
    }

    fn require_entity(&self, entity: EntityId) -> Result<(), RegistryError> {
        if self.entities.exists(entity) {
            Ok(())
        } else {
            Err(RegistryError::UnknownEntity(entity))
        }
    }

    fn require_slot(&self, component: ComponentId) -> Result<&ComponentSlot, RegistryError> {
        self.slot(component)
            .ok_or(RegistryError::UnknownComponent(component))
    }

    pub fn has_component(&self, entity: EntityId, component: ComponentId) -> bool {
        self.slot(component)
            .is_some_and(|slot| slot.live.contains_erased(entity))
    }

    pub fn get_component<T: 'static>(
        &self,
        entity: EntityId,
        component: ComponentId,
    ) -> Result<&T, RegistryError> {
        self.require_entity(entity)?;
        let slot = self.require_slot(component)?;
        downcast::<T>(slot.live.as_ref())
            .get(entity)
            .ok_or(RegistryError::ComponentMissing(entity, component))
    }

    pub fn get_component_mut<T: 'static>(
        &mut self,
        entity: EntityId,
        component: ComponentId,
    ) -> Result<&mut T, RegistryError> {
        self.require_entity(entity)?;
        let slot = self
            .slot_mut(component)
            .ok_or(RegistryError::UnknownComponent(component))?;
        downcast_mut::<T>(slot.live.as_mut())
            .get_mut(entity)
            .ok_or(RegistryError::ComponentMissing(entity, component))
    }

    /// Add `component` to `entity` outside of a tick (spec §3: "created by `add_component`
    /// (outside tick) ..."). Erroneous double-add is rejected rather than silently overwriting,
    /// per §4.1.
    pub fn add_component<T: 'static>(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        value: T,
    ) -> Result<(), RegistryError> {
        self.require_entity(entity)?;
        if self.has_component(entity, component) {
            return Err(RegistryError::ComponentAlreadyPresent(entity, component));
        }
        let slot = self
            .slot_mut(component)
            .ok_or(RegistryError::UnknownComponent(component))?;
        downcast_mut::<T>(slot.live.as_mut()).insert(entity, value);
        if slot.removed.remove(entity).is_none() {
            slot.added.insert(entity, ());
        }
        Ok(())
    }

    /// Write a new value over an existing component (spec §4.4 `update`). Snapshots the
    /// pre-write value into `BeforeChange<C>` on the first write of the tick.
    pub fn update_component<T: 'static>(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        value: T,
    ) -> Result<(), RegistryError> {
        self.require_entity(entity)?;
        if !self.has_component(entity, component) {
            return Err(RegistryError::ComponentMissing(entity, component));
        }
        let slot = self
            .slot_mut(component)
            .ok_or(RegistryError::UnknownComponent(component))?;
        let previous = downcast_mut::<T>(slot.live.as_mut())
            .insert(entity, value)
            .expect("presence already verified above");
        if !slot.before_change.contains_erased(entity) {
            downcast_mut::<T>(slot.before_change.as_mut()).insert(entity, previous);
        }
        if !slot.added.contains(entity) {
            slot.changed.insert(entity, ());
        }
        Ok(())
    }

    /// Remove `component` from `entity` immediately (spec §3: the symmetric counterpart of
    /// direct `add_component`; not the staged form a system body uses mid-tick, see
    /// [`Registry::stage_pending_remove`]).
    pub fn remove_component<T: 'static>(
        &mut self,
        entity: EntityId,
        component: ComponentId,
    ) -> Result<(), RegistryError> {
        self.require_entity(entity)?;
        if !self.has_component(entity, component) {
            return Err(RegistryError::ComponentMissing(entity, component));
        }
        let slot = self
            .slot_mut(component)
            .ok_or(RegistryError::UnknownComponent(component))?;
        slot.added.remove(entity);
        let value = downcast_mut::<T>(slot.live.as_mut())
            .remove(entity)
            .expect("presence already verified above");
        downcast_mut::<T>(slot.temp_storage.as_mut()).insert(entity, value);
        slot.removed.insert(entity, ());
        Ok(())
    }

    pub fn count_components(&self, entity: EntityId) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|slot| slot.live.contains_erased(entity))
            .count()
    }

    /// Visit every component currently held by `entity`. Order is unspecified (spec §4.1).
    pub fn each_component(&self, entity: EntityId, mut f: impl FnMut(ComponentId, &dyn std::any::Any)) {
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(slot) = slot else { continue };
            if let Some(value) = slot.live.get_erased(entity) {
                f(ComponentId::new(index as u32), value);
            }
        }
    }

    /// Type-erased counterpart of [`Registry::update_component`].
    pub fn update_component_erased(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        value: Box<dyn std::any::Any + Send + Sync>,
    ) -> Result<(), RegistryError> {
        self.require_entity(entity)?;
        if !self.has_component(entity, component) {
            return Err(RegistryError::ComponentMissing(entity, component));
        }
        let slot = self
            .slot_mut(component)
            .ok_or(RegistryError::UnknownComponent(component))?;
        let Some(previous) = slot.live.replace_erased(entity, value) else {
            return Ok(());
        };
        if !slot.before_change.contains_erased(entity) {
            slot.before_change.insert_erased(entity, previous);
        }
        if !slot.added.contains(entity) {
            slot.changed.insert(entity, ());
        }
        Ok(())
    }

    /// Type-erased counterpart of [`Registry::add_component`], for callers that only hold a
    /// `ComponentId` and a boxed payload (spec §6 `ExecutionOptions` pre-tick add batches).
    pub fn add_component_erased(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        value: Box<dyn std::any::Any + Send + Sync>,
    ) -> Result<(), RegistryError> {
        self.require_entity(entity)?;
        if self.has_component(entity, component) {
            return Err(RegistryError::ComponentAlreadyPresent(entity, component));
        }
        let slot = self
            .slot_mut(component)
            .ok_or(RegistryError::UnknownComponent(component))?;
        slot.live.insert_erased(entity, value);
        if slot.removed.remove(entity).is_none() {
            slot.added.insert(entity, ());
        }
        Ok(())
    }

    /// Type-erased counterpart of [`Registry::remove_component`].
    pub fn remove_component_erased(
        &mut self,
        entity: EntityId,
        component: ComponentId,
    ) -> Result<(), RegistryError> {
        self.require_entity(entity)?;
        if !self.has_component(entity, component) {
            return Err(RegistryError::ComponentMissing(entity, component));
        }
        let slot = self
            .slot_mut(component)
            .ok_or(RegistryError::UnknownComponent(component))?;
        slot.added.remove(entity);
        slot.live.move_into_erased(entity, slot.temp_storage.as_mut());
        slot.removed.insert(entity, ());
        Ok(())
    }

    // ---- staged mutation API, used by the execution context during a tick (spec §4.4, §4.5) --

    /// Stage an add from inside a system body. Not visible to `get`/`has` until flushed (spec
    /// §5 ordering guarantees).
    pub(crate) fn stage_pending_add<T: 'static>(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        value: T,
    ) {
        let Some(slot) = self.slot_mut(component) else {
            warn!("stage_pending_add: component {component} is not registered");
            return;
        };
        downcast_mut::<T>(slot.pending_add.as_mut()).insert(entity, value);
        if slot.removed.remove(entity).is_none() {
            slot.added.insert(entity, ());
        }
    }

    /// Type-erased counterpart of [`Registry::stage_pending_add`], used by `generate` (spec
    /// §4.4) where the caller enumerates a component-id set without any single concrete type
    /// parameter to thread through.
    pub(crate) fn stage_pending_add_erased(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        value: Box<dyn std::any::Any + Send + Sync>,
    ) {
        let Some(slot) = self.slot_mut(component) else {
            warn!("stage_pending_add_erased: component {component} is not registered");
            return;
        };
        slot.pending_add.insert_erased(entity, value);
        if slot.removed.remove(entity).is_none() {
            slot.added.insert(entity, ());
        }
    }

    /// Stage a remove from inside a system body. The value is not actually taken out of `live`
    /// until [`Registry::flush_pending`] runs, so sibling reads within the same system
    /// iteration still see it (spec §5).
    pub(crate) fn stage_pending_remove(&mut self, entity: EntityId, component: ComponentId) {
        let Some(slot) = self.slot_mut(component) else {
            warn!("stage_pending_remove: component {component} is not registered");
            return;
        };
        slot.added.remove(entity);
        slot.pending_remove.insert(entity, ());
        slot.removed.insert(entity, ());
    }

    /// Whether `component` has a pending add or remove staged for `entity` this tick, used by
    /// the execution context to diagnose a double `add`/`remove` (spec §4.4 invariants).
    pub(crate) fn has_pending_add(&self, entity: EntityId, component: ComponentId) -> bool {
        self.slot(component)
            .is_some_and(|slot| slot.pending_add.contains_erased(entity))
    }

    pub(crate) fn has_pending_remove(&self, entity: EntityId, component: ComponentId) -> bool {
        self.slot(component)
            .is_some_and(|slot| slot.pending_remove.contains(entity))
    }

    /// Flush every staged add/remove for `component` into live storage (spec §4.5 step 4).
    /// Called once a system has finished iterating its view.
    pub(crate) fn flush_pending<T: 'static>(&mut self, component: ComponentId) {
        let Some(slot) = self.slot_mut(component) else {
            return;
        };

        let removed: Vec<EntityId> = slot.pending_remove.entities().to_vec();
        for entity in removed {
            if let Some(value) = downcast_mut::<T>(slot.live.as_mut()).remove(entity) {
                downcast_mut::<T>(slot.temp_storage.as_mut()).insert(entity, value);
            }
        }
        slot.pending_remove.clear();

        let added = downcast_mut::<T>(slot.pending_add.as_mut()).drain();
        let live = downcast_mut::<T>(slot.live.as_mut());
        for (entity, value) in added {
            live.insert(entity, value);
        }
    }

    /// Type-erased counterpart of [`Registry::flush_pending`], used by the scheduler (spec
    /// §4.5 step 4), which only ever has a `ComponentId` to flush by.
    pub(crate) fn flush_pending_erased(&mut self, component: ComponentId) {
        let Some(slot) = self.slot_mut(component) else {
            return;
        };

        let removed: Vec<EntityId> = slot.pending_remove.entities().to_vec();
        for entity in removed {
            slot.live.move_into_erased(entity, slot.temp_storage.as_mut());
        }
        slot.pending_remove.clear();

        for (entity, value) in slot.pending_add.drain_erased() {
            slot.live.insert_erased(entity, value);
        }
    }

    /// Remove `component` from every entity that has it, without constructing a view (spec
    /// §4.5 step 2 "blanket clear" for a trivial system with a single, unfiltered `Removes`).
    /// Still marks `Removed<C>`/`TempStorage<C>` for each entity so remove events fire normally.
    pub(crate) fn blanket_remove_all(&mut self, component: ComponentId) {
        let Some(slot) = self.slot_mut(component) else {
            return;
        };
        let mut entities = Vec::with_capacity(slot.live.len_erased());
        slot.live.each_erased(&mut |entity, _| entities.push(entity));
        for entity in entities {
            slot.added.remove(entity);
            slot.live.move_into_erased(entity, slot.temp_storage.as_mut());
            slot.removed.insert(entity, ());
        }
    }

    /// Sort a component's live storage by ascending [`EntityId`] (spec §9 Open Question: always
    /// sort when a multi-level system hierarchy is present, to guarantee deterministic
    /// cascades). The component descriptor's equality comparator, when present, distinguishes
    /// genuine value changes for event suppression (spec §4.6) but does not define an ordering,
    /// so entity id is the sort key here rather than component value.
    pub(crate) fn sort_storage_for_determinism(&mut self, component: ComponentId) {
        if let Some(slot) = self.slot_mut(component) {
            slot.live.sort_by_entity_erased();
        }
    }

    // ---- event-tracker access (spec §4.6) -------------------------------------------------

    pub(crate) fn added_marker(&self, component: ComponentId) -> Option<&SparseSet<()>> {
        self.slot(component).map(|s| &s.added)
    }

    pub(crate) fn changed_marker(&self, component: ComponentId) -> Option<&SparseSet<()>> {
        self.slot(component).map(|s| &s.changed)
    }

    pub(crate) fn removed_marker(&self, component: ComponentId) -> Option<&SparseSet<()>> {
        self.slot(component).map(|s| &s.removed)
    }

    pub(crate) fn before_change_storage(&self, component: ComponentId) -> Option<&dyn ErasedStorage> {
        self.slot(component).map(|s| s.before_change.as_ref())
    }

    pub(crate) fn temp_storage(&self, component: ComponentId) -> Option<&dyn ErasedStorage> {
        self.slot(component).map(|s| s.temp_storage.as_ref())
    }

    pub(crate) fn live_storage(&self, component: ComponentId) -> Option<&dyn ErasedStorage> {
        self.slot(component).map(|s| s.live.as_ref())
    }

    /// Clear every marker storage (spec invariant 2: after `execute_systems` returns, every
    /// marker storage is empty).
    pub(crate) fn clear_all_markers(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.clear_markers();
        }
    }

    /// Clear every storage registered as `transient` (spec §4.5: "Transient components: clear
    /// every storage marked transient").
    pub(crate) fn clear_transient_storages(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(slot) = slot else { continue };
            let id = ComponentId::new(index as u32);
            if self.components.get(id).is_some_and(|d| d.is_transient()) {
                slot.live.clear_erased();
            }
        }
    }
}
