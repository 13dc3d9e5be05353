//! Per-tick execution options (spec §6): the caller's pre-execution mutation batch and the
//! actions to dispatch this tick, modeled directly on the original source's execution-options
//! struct shape but expressed as owned Rust vectors instead of parallel C arrays.

use std::any::Any;

use log::warn;

use crate::id::{ComponentId, EntityId, SystemId};
use crate::registry::Registry;

/// One component value bound to an entity, used for the add/update batches.
pub struct ComponentPatch {
    pub entity: EntityId,
    pub component: ComponentId,
    pub value: Box<dyn Any + Send + Sync>,
}

/// One action dispatch record: an action shares the system id space (spec §3), carrying a
/// type-erased payload the dispatched system's body reads via `ExecutionContext::action`.
pub struct ActionInvocation {
    pub action: SystemId,
    pub payload: Box<dyn Any + Send + Sync>,
}

/// Everything a caller supplies for one `execute_systems` call (spec §6).
#[derive(Default)]
pub struct ExecutionOptions {
    adds: Vec<ComponentPatch>,
    updates: Vec<ComponentPatch>,
    removes: Vec<(EntityId, ComponentId)>,
    actions: Vec<ActionInvocation>,
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, entity: EntityId, component: ComponentId, value: impl Any + Send + Sync) -> Self {
        self.adds.push(ComponentPatch {
            entity,
            component,
            value: Box::new(value),
        });
        self
    }

    pub fn update(mut self, entity: EntityId, component: ComponentId, value: impl Any + Send + Sync) -> Self {
        self.updates.push(ComponentPatch {
            entity,
            component,
            value: Box::new(value),
        });
        self
    }

    pub fn remove(mut self, entity: EntityId, component: ComponentId) -> Self {
        self.removes.push((entity, component));
        self
    }

    pub fn action(mut self, action: SystemId, payload: impl Any + Send + Sync) -> Self {
        self.actions.push(ActionInvocation {
            action,
            payload: Box::new(payload),
        });
        self
    }

    pub fn actions(&self) -> &[ActionInvocation] {
        &self.actions
    }

    /// Apply the pre-execution add/update/remove batches directly to `registry` (spec §2 data
    /// flow: "caller supplies `ExecutionOptions` -> registry applies pre-execution
    /// add/update/remove"). Per-entry errors are logged and the remaining entries still apply
    /// (spec §7: entity-scoped errors don't abort the tick). Draining rather than consuming
    /// `self` leaves the action batch available to the scheduler afterward.
    pub fn apply(&mut self, registry: &mut Registry) {
        for patch in self.adds.drain(..) {
            if let Err(err) = registry.add_component_erased(patch.entity, patch.component, patch.value) {
                warn!("pre-tick add skipped: {err}");
            }
        }
        for patch in self.updates.drain(..) {
            if let Err(err) = registry.update_component_erased(patch.entity, patch.component, patch.value) {
                warn!("pre-tick update skipped: {err}");
            }
        }
        for (entity, component) in self.removes.drain(..) {
            if let Err(err) = registry.remove_component_erased(entity, component) {
                warn!("pre-tick remove skipped: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentDesc;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Health {
        hp: i32,
    }

    #[test]
    fn apply_runs_adds_before_updates_before_removes() {
        // Given
        let mut registry = Registry::new(None);
        let health = ComponentId::new(0);
        registry.register_component(ComponentDesc::new::<Health>(health));
        let entity = registry.create_entity();

        let mut options = ExecutionOptions::new()
            .add(entity, health, Health { hp: 1 })
            .update(entity, health, Health { hp: 2 })
            .remove(entity, health);

        // When
        options.apply(&mut registry);

        // Then
        assert!(!registry.has_component(entity, health));
    }

    #[test]
    fn malformed_entry_does_not_block_the_rest_of_the_batch() {
        // Given
        let mut registry = Registry::new(None);
        let health = ComponentId::new(0);
        registry.register_component(ComponentDesc::new::<Health>(health));
        let entity = registry.create_entity();
        let ghost = EntityId::new(999);

        let mut options = ExecutionOptions::new()
            .add(ghost, health, Health { hp: 1 })
            .add(entity, health, Health { hp: 5 });

        // When
        options.apply(&mut registry);

        // Then
        assert!(registry.has_component(entity, health));
    }
}
