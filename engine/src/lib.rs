//! A capability-scheduled entity-component-system runtime with a WASM system-impl host.
//!
//! A [`Registry`](registry::Registry) owns entities and their components; systems are declared
//! ahead of time as [`SystemDesc`](system::SystemDesc)s with a [`CapabilityTable`]
//! (capability::CapabilityTable) describing which components they read, write, add, or remove.
//! [`schedule::execute_systems`] drives one tick: it applies a batch of pre-tick mutations
//! ([`ExecutionOptions`](options::ExecutionOptions)), walks the execution-order DAG, runs each
//! system's body (native or, via [`wasm::Host`], WASM-hosted) over the entities its capabilities
//! select, and finally emits init/update/remove events to an [`EventSink`](event::EventSink).

pub mod capability;
pub mod component;
pub mod entity;
pub mod error;
pub mod event;
pub mod id;
pub mod options;
pub mod registry;
pub mod schedule;
pub mod storage;
pub mod system;
pub mod view;
pub mod wasm;

pub use capability::{Capability, CapabilityTable};
pub use component::{Component, ComponentDesc, ComponentRegistry};
pub use event::EventSink;
pub use id::{ComponentId, EntityId, RegistryId, SystemId};
pub use options::{ActionInvocation, ComponentPatch, ExecutionOptions};
pub use registry::Registry;
pub use schedule::{execute_systems, ExecutionOrder, WasmDispatch};
pub use system::context::ExecutionContext;
pub use system::{Body, SystemDesc, SystemRegistry};
pub use wasm::{Host, LoadError, TrapError};
