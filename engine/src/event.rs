//! End-of-tick event emission (spec §4.6): init, update, then remove callbacks, in that fixed
//! order, drained from the marker storages a tick's mutations left behind.

use std::any::Any;

use crate::id::{ComponentId, EntityId};
use crate::registry::Registry;

/// Receives event callbacks in tick-end order: every init, then every update, then every
/// remove (spec §4.6). A caller wires this to whatever downstream notification mechanism it
/// needs (network replication, a UI diff, a test probe).
pub trait EventSink {
    fn on_init(&mut self, entity: EntityId, component: ComponentId, value: &dyn Any);
    fn on_update(&mut self, entity: EntityId, component: ComponentId, value: &dyn Any);
    fn on_remove(&mut self, entity: EntityId, component: ComponentId, value: &dyn Any);
}

/// Drain `registry`'s marker storages into `sink`, then clear every marker (spec invariant 2:
/// after `execute_systems` returns, every marker storage is empty). Component iteration order
/// within each phase is registration order; callers that need entity-stable ordering should
/// sort downstream.
pub fn emit_events(registry: &mut Registry, sink: &mut dyn EventSink) {
    let components: Vec<ComponentId> = registry.component_ids().collect();

    for &component in &components {
        let Some(added) = registry.added_marker(component) else { continue };
        let Some(live) = registry.live_storage(component) else { continue };
        for entity in added.entities().to_vec() {
            if let Some(value) = live.get_erased(entity) {
                sink.on_init(entity, component, value);
            }
        }
    }

    for &component in &components {
        let Some(desc) = registry.component_desc(component) else { continue };
        if desc.is_zero_sized() {
            continue;
        }
        let Some(changed) = registry.changed_marker(component) else { continue };
        let Some(live) = registry.live_storage(component) else { continue };
        let Some(before) = registry.before_change_storage(component) else { continue };
        for entity in changed.entities().to_vec() {
            let (Some(current), Some(previous)) = (live.get_erased(entity), before.get_erased(entity)) else {
                continue;
            };
            if desc.values_equal(previous, current) {
                continue;
            }
            sink.on_update(entity, component, current);
        }
    }

    for &component in &components {
        let Some(removed) = registry.removed_marker(component) else { continue };
        let Some(temp) = registry.temp_storage(component) else { continue };
        for entity in removed.entities().to_vec() {
            if let Some(value) = temp.get_erased(entity) {
                sink.on_remove(entity, component, value);
            }
        }
    }

    registry.clear_all_markers();
}
