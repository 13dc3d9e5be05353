//! The execution context handed to a system body (spec §4.4).
//!
//! This is the callback interface a native closure or a WASM-hosted function invokes against:
//! `get`/`update`/`add`/`remove`/`has`/`generate`/`parent`/`same`/`action`, each honoring the
//! capability the owning [`SystemDesc`](crate::system::SystemDesc) declared. There is no
//! teacher analogue for this module — the teacher's systems borrow `&World`/`&mut World`
//! directly rather than going through a capability-checked callback surface — so it follows the
//! teacher's `debug_assert!`-style fail-fast posture for programmer errors (spec §7 bullet 1)
//! without copying any particular teacher file.

use std::any::Any;

use log::warn;

use crate::capability::Capability;
use crate::component::ComponentDesc;
use crate::error::CapabilityError;
use crate::id::{ComponentId, EntityId, SystemId};
use crate::registry::Registry;
use crate::system::SystemDesc;

/// Identity of the context one level up the system hierarchy, if any (spec §4.4 `parent()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentHandle {
    pub system: SystemId,
    pub entity: EntityId,
}

/// Bound to one `(system, entity)` pair for the duration of a single body invocation.
pub struct ExecutionContext<'a> {
    registry: &'a mut Registry,
    system: &'a SystemDesc,
    entity: EntityId,
    parent: Option<ParentHandle>,
    action_payload: Option<&'a (dyn Any + Send + Sync)>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        registry: &'a mut Registry,
        system: &'a SystemDesc,
        entity: EntityId,
        parent: Option<ParentHandle>,
        action_payload: Option<&'a (dyn Any + Send + Sync)>,
    ) -> Self {
        Self {
            registry,
            system,
            entity,
            parent,
            action_payload,
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn system(&self) -> SystemId {
        self.system.id()
    }

    #[cfg(debug_assertions)]
    fn assert_capability(&self, component: ComponentId, reason: &'static str, predicate: impl FnOnce(Capability) -> bool) {
        let ok = self.system.capabilities().get(component).is_some_and(predicate);
        if !ok {
            let err = CapabilityError {
                system: self.system.id(),
                component,
                reason,
            };
            panic!("{err}");
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    fn assert_capability(&self, _component: ComponentId, _reason: &'static str, _predicate: impl FnOnce(Capability) -> bool) {}

    /// `get<C>()` (spec §4.4): requires `Readonly` or `Readwrite`.
    pub fn get<T: 'static>(&self, component: ComponentId) -> Option<&T> {
        self.assert_capability(component, "get requires Readonly or Readwrite", |c| c.can_read());
        self.registry.get_component::<T>(self.entity, component).ok()
    }

    /// `has<C>()` (spec §4.4): membership query, allowed for any declared capability on `C`.
    pub fn has(&self, component: ComponentId) -> bool {
        self.assert_capability(component, "has requires a declared capability for the component", |_| true);
        self.registry.has_component(self.entity, component)
    }

    /// `update<C>(v)` (spec §4.4): requires `Writeonly` or `Readwrite`. Calling it on an entity
    /// that does not hold `component` is a programmer error grouped with double-add/double-remove
    /// under spec §7 bullet 1: fail-fast (panic) in debug builds, logged and dropped in release.
    pub fn update<T: 'static>(&mut self, component: ComponentId, value: T) {
        self.assert_capability(component, "update requires Writeonly or Readwrite", |c| c.can_write());
        if let Err(err) = self.registry.update_component(self.entity, component, value) {
            self.programmer_error(format_args!(
                "system {} called update on entity {} which does not hold component {component}: {err}",
                self.system.id(),
                self.entity
            ));
        }
    }

    /// `add<C>(v)` (spec §4.4): requires `Adds`. Staged; not visible until the system's
    /// iteration flushes (spec §4.5 step 4).
    pub fn add<T: 'static>(&mut self, component: ComponentId, value: T) {
        self.assert_capability(component, "add requires Adds", |c| c.can_add());
        if self.registry.has_pending_add(self.entity, component) {
            self.programmer_error(format_args!(
                "system {} called add twice for entity {} component {component} in the same invocation",
                self.system.id(),
                self.entity
            ));
            return;
        }
        self.registry.stage_pending_add(self.entity, component, value);
    }

    /// `remove<C>()` (spec §4.4): requires `Removes`. Staged; the value is still visible to
    /// `get`/`has` from this point until the flush (spec §5).
    pub fn remove(&mut self, component: ComponentId) {
        self.assert_capability(component, "remove requires Removes", |c| c.can_remove());
        if !self.registry.has_component(self.entity, component)
            || self.registry.has_pending_remove(self.entity, component)
        {
            self.programmer_error(format_args!(
                "system {} called remove on entity {} which does not hold component {component}",
                self.system.id(),
                self.entity
            ));
            return;
        }
        self.registry.stage_pending_remove(self.entity, component);
    }

    /// Uniform handling for the programmer-error cases spec §7 bullet 1 groups together
    /// (double-add, double-remove, update-missing, illegal capability use): panics in debug
    /// builds so the bug surfaces immediately, logs and no-ops in release so a malformed system
    /// body can't take down a production tick.
    #[cfg(debug_assertions)]
    fn programmer_error(&self, message: std::fmt::Arguments<'_>) {
        panic!("{message}");
    }

    #[cfg(not(debug_assertions))]
    fn programmer_error(&self, message: std::fmt::Arguments<'_>) {
        warn!("{message}");
    }

    /// `generate(ids, datas)` (spec §4.4): creates a new entity and stages a pending add for
    /// each listed component. Requires the system to be declared a generator.
    pub fn generate(&mut self, components: Vec<(ComponentId, Box<dyn Any + Send + Sync>)>) -> EntityId {
        if !self.system.is_generator() {
            panic!("system {} is not declared as a generator", self.system.id());
        }
        let entity = self.registry.create_entity();
        for (component, value) in components {
            self.registry.stage_pending_add_erased(entity, component, value);
        }
        entity
    }

    /// `parent()` (spec §4.4): identity of the enclosing context for a nested (child) system,
    /// if any.
    pub fn parent(&self) -> Option<ParentHandle> {
        self.parent
    }

    /// `same(other)` (spec §4.4): whether two context handles refer to the same
    /// `(system, entity)` pair.
    pub fn same(&self, other: &ExecutionContext<'_>) -> bool {
        self.system.id() == other.system.id() && self.entity == other.entity
    }

    /// `action()` (spec §4.4): the current action's payload, if this invocation is dispatching
    /// an action record.
    pub fn action<T: 'static>(&self) -> Option<&T> {
        self.action_payload.and_then(|payload| payload.downcast_ref::<T>())
    }

    /// Look up a component's static descriptor. Used by the WASM import shims to translate a
    /// guest component id into a byte count for `get`/`add`/`update` (spec §4.7), since the
    /// guest side has no access to Rust type information.
    pub fn component_desc(&self, component: ComponentId) -> Option<&ComponentDesc> {
        self.registry.component_desc(component)
    }
}
