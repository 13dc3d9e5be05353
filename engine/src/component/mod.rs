//! Static component type descriptors (spec §3 "Component type descriptor").
//!
//! Every component a registry will store must be registered once, ahead of any entity
//! creation, with a [`ComponentDesc`] describing its id, optional name, byte size, optional
//! equality comparator, and whether it is `transient`. This mirrors the teacher codebase's
//! type-registry `TypeInfo` (layout + drop function) but keyed by the schema-assigned
//! [`ComponentId`] rather than discovered from a Rust `TypeId`, since this spec's components
//! are declared by id up front rather than inferred from the type system (spec §9: "a runtime
//! registry keyed by `ComponentId`, with a virtual-style vtable per component").

use std::any::Any;
use std::fmt;

use crate::id::ComponentId;
use crate::storage::ErasedStorage;

/// Marker trait for anything that can be stored as a component value. Blanket-implemented for
/// every `'static + Send + Sync` type so callers never write `impl Component for X {}`
/// themselves.
pub trait Component: Any + Send + Sync {}
impl<T: Any + Send + Sync> Component for T {}

type CompareFn = Box<dyn Fn(&dyn Any, &dyn Any) -> bool + Send + Sync>;
type StorageFactory = fn() -> Box<dyn ErasedStorage>;

/// Static, per-type metadata a registry needs to create and manage one component's storage.
pub struct ComponentDesc {
    id: ComponentId,
    name: Option<String>,
    size: usize,
    transient: bool,
    compare: Option<CompareFn>,
    make_storage: StorageFactory,
}

impl fmt::Debug for ComponentDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDesc")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("transient", &self.transient)
            .field("has_compare", &self.compare.is_some())
            .finish()
    }
}

impl ComponentDesc {
    /// Describe component type `T` under `id`, with no comparator and not transient.
    pub fn new<T: Component>(id: ComponentId) -> Self {
        Self {
            id,
            name: None,
            size: std::mem::size_of::<T>(),
            transient: false,
            compare: None,
            make_storage: make_storage::<T>,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Install an equality comparator for `T`. Needed for the event tracker's write-equal
    /// suppression (spec §4.6): without one, every `update` is treated as a genuine change.
    pub fn with_compare<T: Component + PartialEq>(mut self) -> Self {
        self.compare = Some(Box::new(|a: &dyn Any, b: &dyn Any| {
            match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }));
        self
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_zero_sized(&self) -> bool {
        self.size == 0
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Compare two erased values of this component's type. Returns `false` (i.e. "treat as
    /// changed") when no comparator was registered.
    pub fn values_equal(&self, a: &dyn Any, b: &dyn Any) -> bool {
        match &self.compare {
            Some(cmp) => cmp(a, b),
            None => false,
        }
    }

    pub fn new_storage(&self) -> Box<dyn ErasedStorage> {
        (self.make_storage)()
    }
}

fn make_storage<T: Component>() -> Box<dyn ErasedStorage> {
    Box::new(crate::storage::SparseSet::<T>::new())
}

/// The set of component descriptors known to a registry, indexed densely by [`ComponentId`].
///
/// Registration is expected to happen once, before any tick runs (spec §10.3: "configuration"
/// for this engine is entirely construction-time), so this is a plain growable `Vec` rather
/// than the concurrent `DashMap` this codebase reaches for when registration can race with
/// lookups from other threads.
#[derive(Default)]
pub struct ComponentRegistry {
    descs: Vec<Option<ComponentDesc>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, desc: ComponentDesc) {
        let index = desc.id().index();
        if index >= self.descs.len() {
            self.descs.resize_with(index + 1, || None);
        }
        self.descs[index] = Some(desc);
    }

    pub fn get(&self, id: ComponentId) -> Option<&ComponentDesc> {
        self.descs.get(id.index()).and_then(|d| d.as_ref())
    }

    pub fn is_registered(&self, id: ComponentId) -> bool {
        self.get(id).is_some()
    }

    /// Iterate every registered component id in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.descs
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.as_ref().map(|_| ComponentId::new(i as u32)))
    }
}
