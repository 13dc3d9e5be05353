//! The tick driver (spec §4.5): walks the execution-order DAG, opens a view per system, runs
//! its body over matching entities (recursing into children), flushes staged mutations, and
//! hands off to the event tracker.

use std::any::Any;
use std::sync::Mutex;

use log::{debug, error, trace};

use crate::capability::Capability;
use crate::event::{emit_events, EventSink};
use crate::id::SystemId;
use crate::options::{ActionInvocation, ExecutionOptions};
use crate::registry::Registry;
use crate::system::context::{ExecutionContext, ParentHandle};
use crate::system::{Body, SystemDesc, SystemRegistry};
use crate::view::View;

/// A handler the host registers to run a `Body::Wasm` system's body for one entity (spec §4.7).
/// Kept as a trait rather than a hard dependency on the WASM host module, so the scheduler has
/// no compile-time knowledge of `wasmtime`.
pub trait WasmDispatch: Send + Sync {
    /// Run the guest export for `system` bound to `ctx`. A returned error means the guest
    /// trapped; the scheduler logs it and moves on to the next entity (spec §4.7, §5).
    fn dispatch(&self, system: SystemId, ctx: &mut ExecutionContext) -> Result<(), String>;
}

/// The execution-order descriptor (spec §4.5): the top-level systems to run, in order. Each
/// system's own children (declared on its [`SystemDesc`]) recurse automatically; this type only
/// orders the top level, since nesting is already captured per-descriptor.
pub struct ExecutionOrder {
    top_level: Vec<SystemId>,
}

impl ExecutionOrder {
    pub fn new(top_level: Vec<SystemId>) -> Self {
        Self { top_level }
    }

    pub fn top_level(&self) -> &[SystemId] {
        &self.top_level
    }

    /// Whether any system reachable from the top level declares children, i.e. the hierarchy is
    /// deeper than one level. When true the scheduler sorts every component storage before
    /// opening views, to guarantee deterministic cascades (spec §9 Open Question, resolved in
    /// favor of always-sort).
    fn has_multi_level_hierarchy(&self, systems: &SystemRegistry) -> bool {
        self.top_level
            .iter()
            .filter_map(|&id| systems.get(id))
            .any(|desc| !desc.children().is_empty())
    }
}

/// Run one tick: apply pre-execution options, walk the execution order, flush staged mutations,
/// clear transients, emit events, clear markers.
pub fn execute_systems(
    registry: &mut Registry,
    systems: &SystemRegistry,
    order: &ExecutionOrder,
    mut options: ExecutionOptions,
    wasm: Option<&dyn WasmDispatch>,
    sink: &mut dyn EventSink,
) {
    debug!("tick start: {} entities", registry.count_entities());

    options.apply(registry);

    if order.has_multi_level_hierarchy(systems) {
        for component in registry.component_ids().collect::<Vec<_>>() {
            trace!("sorting storage for component {component} (multi-level hierarchy present)");
            registry.sort_storage_for_determinism(component);
        }
    }

    for &id in order.top_level() {
        match systems.get(id) {
            Some(desc) => run_system(registry, systems, desc, None, options.actions(), wasm),
            None => error!("execution order references unregistered system {id}"),
        }
    }

    registry.clear_transient_storages();
    emit_events(registry, sink);
    debug!("tick end");
}

/// Dispatch `desc`, matching it against `actions` if it is declared an action (spec §4.5
/// "Action dispatch"), otherwise running it unconditionally once.
fn run_system(
    registry: &mut Registry,
    systems: &SystemRegistry,
    desc: &SystemDesc,
    parent: Option<ParentHandle>,
    actions: &[ActionInvocation],
    wasm: Option<&dyn WasmDispatch>,
) {
    if desc.is_action() {
        for action in actions {
            if action.action == desc.id() {
                run_system_once(registry, systems, desc, parent, Some(action.payload.as_ref()), actions, wasm);
            }
        }
    } else {
        run_system_once(registry, systems, desc, parent, None, actions, wasm);
    }
}

/// Open `desc`'s view (or take the blanket-clear fast path), run its body per entity, recurse
/// into children, then flush whatever it staged.
fn run_system_once(
    registry: &mut Registry,
    systems: &SystemRegistry,
    desc: &SystemDesc,
    parent: Option<ParentHandle>,
    action_payload: Option<&(dyn Any + Send + Sync)>,
    actions: &[ActionInvocation],
    wasm: Option<&dyn WasmDispatch>,
) {
    if let Some(component) = desc.blanket_clear_target() {
        trace!("system {}: blanket-clearing component {component}", desc.id());
        registry.blanket_remove_all(component);
        flush_system(registry, desc);
        return;
    }

    let view = View::build(registry, desc.capabilities());
    trace!("system {}: view has {} entities", desc.id(), view.len());

    let parallel = parent.is_none() && action_payload.is_none() && desc.is_parallel_eligible();
    if parallel {
        trace!("system {}: running {} entities in parallel", desc.id(), view.len());
        run_parallel(registry, desc, &view, wasm);
    } else {
        for &entity in view.entities() {
            let mut ctx = ExecutionContext::new(registry, desc, entity, parent, action_payload);
            dispatch_body(&mut ctx, desc, wasm);

            for &child_id in desc.children() {
                if let Some(child) = systems.get(child_id) {
                    let child_parent = Some(ParentHandle {
                        system: desc.id(),
                        entity,
                    });
                    run_system(registry, systems, child, child_parent, actions, wasm);
                }
            }
        }
    }

    flush_system(registry, desc);
}

fn dispatch_body(ctx: &mut ExecutionContext, desc: &SystemDesc, wasm: Option<&dyn WasmDispatch>) {
    match desc.body() {
        Body::Trivial => {
            // Only removes auto-apply (spec §4.5 step 3b); a trivial "adds" capability has no
            // literal value to write without a user body, so there is nothing to do here beyond
            // what the blanket-clear fast path already handles for the removes-only case.
            for &(component, capability) in desc.capabilities().entries() {
                if matches!(capability, Capability::Removes) {
                    ctx.remove(component);
                }
            }
        }
        Body::Native(body) => body(ctx),
        Body::Wasm => match wasm {
            Some(host) => {
                if let Err(trap) = host.dispatch(desc.id(), ctx) {
                    error!("system {} trapped: {trap}", desc.id());
                }
            }
            None => error!("system {} has a WASM body but no WASM host was supplied", desc.id()),
        },
    }
}

/// Run a parallel-eligible system's per-entity bodies across worker threads (spec §4.5, §5).
/// Each entity's invocation is serialized behind a single mutex rather than splitting the
/// registry's type-erased storages into disjoint mutable borrows — since every entity's slot is
/// independent, interleaving across threads in any order still yields the same final state as
/// serial execution (spec invariant 6), so this is sufficient to satisfy S5 without unsafe
/// pointer-splitting through `dyn Any`-erased storage.
fn run_parallel(registry: &mut Registry, desc: &SystemDesc, view: &View, wasm: Option<&dyn WasmDispatch>) {
    let registry = Mutex::new(registry);
    let chunk_size = parallel_chunk_size(view.len());
    crossbeam::scope(|scope| {
        for chunk in view.entities().chunks(chunk_size.max(1)) {
            let registry = &registry;
            scope.spawn(move |_| {
                for &entity in chunk {
                    let mut guard = registry.lock().expect("registry mutex poisoned");
                    let mut ctx = ExecutionContext::new(&mut **guard, desc, entity, None, None);
                    dispatch_body(&mut ctx, desc, wasm);
                }
            });
        }
    })
    .expect("parallel system execution panicked");
}

fn parallel_chunk_size(total: usize) -> usize {
    let workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    (total / workers.max(1)).max(1)
}

fn flush_system(registry: &mut Registry, desc: &SystemDesc) {
    for &(component, capability) in desc.capabilities().entries() {
        if matches!(capability, Capability::Adds | Capability::Removes) {
            registry.flush_pending_erased(component);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentDesc;
    use crate::id::{ComponentId, EntityId};

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Tag;

    #[derive(Default)]
    struct NullSink;
    impl EventSink for NullSink {
        fn on_init(&mut self, _e: EntityId, _c: ComponentId, _v: &dyn Any) {}
        fn on_update(&mut self, _e: EntityId, _c: ComponentId, _v: &dyn Any) {}
        fn on_remove(&mut self, _e: EntityId, _c: ComponentId, _v: &dyn Any) {}
    }

    #[test]
    fn trivial_unfiltered_removes_is_blanket_cleared() {
        // Given
        let mut registry = Registry::new(None);
        let tag = ComponentId::new(0);
        registry.register_component(ComponentDesc::new::<Tag>(tag));
        let a = registry.create_entity();
        let b = registry.create_entity();
        registry.add_component(a, tag, Tag).unwrap();
        registry.add_component(b, tag, Tag).unwrap();

        let mut systems = SystemRegistry::new();
        systems.register(
            SystemDesc::new(SystemId::new(0), Body::Trivial).with_capability(tag, Capability::Removes),
        );
        let order = ExecutionOrder::new(vec![SystemId::new(0)]);

        // When
        execute_systems(&mut registry, &systems, &order, ExecutionOptions::new(), None, &mut NullSink);

        // Then
        assert!(!registry.has_component(a, tag));
        assert!(!registry.has_component(b, tag));
    }

    #[test]
    fn action_system_runs_once_per_matching_record() {
        // Given
        let mut registry = Registry::new(None);
        let tag = ComponentId::new(0);
        registry.register_component(ComponentDesc::new::<Tag>(tag));
        let entity = registry.create_entity();

        let mut systems = SystemRegistry::new();
        let runs = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let runs_clone = runs.clone();
        systems.register(
            SystemDesc::new(
                SystemId::new(1),
                Body::Native(std::sync::Arc::new(move |_ctx: &mut ExecutionContext<'_>| {
                    runs_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                })),
            )
            .as_action(),
        );
        let order = ExecutionOrder::new(vec![SystemId::new(1)]);
        let _ = entity;

        let options = ExecutionOptions::new()
            .action(SystemId::new(1), ())
            .action(SystemId::new(1), ());

        // When
        execute_systems(&mut registry, &systems, &order, options, None, &mut NullSink);

        // Then
        assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
