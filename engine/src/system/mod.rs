//! Static system descriptors and the system implementation registry (spec §3 "System type
//! descriptor", §4.5).
//!
//! A [`SystemDesc`] is the scheduling-time counterpart of a [`ComponentDesc`](crate::component::ComponentDesc):
//! declared once, ahead of execution, naming the system's place in the execution-order DAG, its
//! [`CapabilityTable`](crate::capability::CapabilityTable), and how its body actually runs.

pub mod context;

use std::sync::Arc;

use crate::capability::{Capability, CapabilityTable};
use crate::id::{ComponentId, SystemId};
use crate::system::context::ExecutionContext;

/// A native system body. Wrapped in `Arc` (not `Box`) because parallel-eligible systems share
/// one body across concurrently running per-entity invocations (spec §4.5).
pub type NativeBody = Arc<dyn Fn(&mut ExecutionContext) + Send + Sync>;

/// How a system's per-entity body is actually run.
pub enum Body {
    /// No user code: the scheduler applies the system's declared adds/removes directly (spec
    /// §4.5 step 3b).
    Trivial,
    /// A Rust closure invoked once per matching entity.
    Native(NativeBody),
    /// Routed through the WASM host, keyed by this system's id (spec §4.7).
    Wasm,
}

/// Static metadata for one system, registered before any tick runs.
pub struct SystemDesc {
    id: SystemId,
    parent: Option<SystemId>,
    children: Vec<SystemId>,
    capabilities: CapabilityTable,
    /// Component-id sets this system may hand to `generate` (spec §4.4).
    generates: Vec<Vec<ComponentId>>,
    /// Declared as an action (spec §4.5 "Action dispatch"): runs only when the tick's
    /// `ExecutionOptions` carries a matching `ActionInvocation`, once per matching record, with
    /// that record's payload bound to the context. A non-action system always runs once per tick.
    is_action: bool,
    body: Body,
}

impl SystemDesc {
    pub fn new(id: SystemId, body: Body) -> Self {
        Self {
            id,
            parent: None,
            children: Vec::new(),
            capabilities: CapabilityTable::new(),
            generates: Vec::new(),
            is_action: false,
            body,
        }
    }

    pub fn as_action(mut self) -> Self {
        self.is_action = true;
        self
    }

    pub fn with_parent(mut self, parent: SystemId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_child(mut self, child: SystemId) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_capability(mut self, component: ComponentId, capability: Capability) -> Self {
        self.capabilities.declare(component, capability);
        self
    }

    pub fn with_generates(mut self, components: Vec<ComponentId>) -> Self {
        self.generates.push(components);
        self
    }

    pub fn id(&self) -> SystemId {
        self.id
    }

    pub fn parent(&self) -> Option<SystemId> {
        self.parent
    }

    pub fn children(&self) -> &[SystemId] {
        &self.children
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    pub fn generates(&self) -> &[Vec<ComponentId>] {
        &self.generates
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn is_trivial(&self) -> bool {
        matches!(self.body, Body::Trivial)
    }

    pub fn is_generator(&self) -> bool {
        !self.generates.is_empty()
    }

    pub fn is_action(&self) -> bool {
        self.is_action
    }

    /// A system is parallel-eligible only if it has no adds, no removes, no generates, and no
    /// children (spec §4.5 "Parallel eligibility").
    pub fn is_parallel_eligible(&self) -> bool {
        !self.capabilities.has_mutating_capability() && !self.is_generator() && self.children.is_empty()
    }

    /// If this system is trivial and declares exactly one `Removes` capability with nothing
    /// else (no other includes/excludes/adds), the scheduler can blanket-clear that component's
    /// storage instead of iterating entities one at a time (spec §4.5 step 2).
    pub fn blanket_clear_target(&self) -> Option<ComponentId> {
        if !self.is_trivial() {
            return None;
        }
        match self.capabilities.entries() {
            [(component, Capability::Removes)] => Some(*component),
            _ => None,
        }
    }
}

/// All registered systems, indexed densely by [`SystemId`] — the same registration shape as
/// [`ComponentRegistry`](crate::component::ComponentRegistry), since systems are also declared
/// by schema id rather than discovered at runtime.
#[derive(Default)]
pub struct SystemRegistry {
    systems: Vec<Option<SystemDesc>>,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, desc: SystemDesc) {
        let index = desc.id().index();
        if index >= self.systems.len() {
            self.systems.resize_with(index + 1, || None);
        }
        self.systems[index] = Some(desc);
    }

    pub fn get(&self, id: SystemId) -> Option<&SystemDesc> {
        self.systems.get(id.index()).and_then(|s| s.as_ref())
    }

    /// Replace a system's body in place, keeping the rest of its descriptor (used by the WASM
    /// host's atomic batch-load to install a resolved export, spec §4.7).
    pub fn set_body(&mut self, id: SystemId, body: Body) {
        if let Some(Some(desc)) = self.systems.get_mut(id.index()) {
            desc.body = body;
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = SystemId> + '_ {
        self.systems
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| SystemId::new(i as u32)))
    }
}
