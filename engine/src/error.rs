//! Error taxonomy for the runtime (see spec §7 / §10.2).
//!
//! Every fallible boundary gets its own hand-rolled error type implementing
//! [`std::error::Error`] — no `thiserror`/`anyhow` dependency is introduced, matching the
//! error-handling idiom already in use for access-conflict and dual-use-registration errors
//! elsewhere in this codebase's lineage.

use std::fmt;

use crate::id::{ComponentId, EntityId, RegistryId};

/// Misuse of the registry's public API by a caller (unknown ids, illegal redundant
/// mutations). These are never silently swallowed; the offending operation is rejected and
/// the registry is left in the state it was in before the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The given entity id has never been created, or was already destroyed.
    UnknownEntity(EntityId),
    /// The given component id was never registered on this registry.
    UnknownComponent(ComponentId),
    /// `add_component` was called for a component the entity already has.
    ComponentAlreadyPresent(EntityId, ComponentId),
    /// `update_component` or `remove_component` was called for a component the entity does
    /// not have.
    ComponentMissing(EntityId, ComponentId),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::UnknownEntity(e) => write!(f, "entity {e} does not exist"),
            RegistryError::UnknownComponent(c) => write!(f, "component {c} is not registered"),
            RegistryError::ComponentAlreadyPresent(e, c) => {
                write!(f, "entity {e} already has component {c}")
            }
            RegistryError::ComponentMissing(e, c) => {
                write!(f, "entity {e} does not have component {c}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// A system body exercised a capability it did not declare (spec §4.4, §7 bullet 1). Only
/// raised in debug builds; in release builds the check is skipped entirely (spec: "behavior
/// is unspecified but must not corrupt unrelated storages").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityError {
    pub system: crate::id::SystemId,
    pub component: ComponentId,
    pub reason: &'static str,
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "system {} exercised component {} without capability: {}",
            self.system, self.component, self.reason
        )
    }
}

impl std::error::Error for CapabilityError {}

/// A registry id passed to a free function did not correspond to any live registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownRegistry(pub RegistryId);

impl fmt::Display for UnknownRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registry {} does not exist", self.0)
    }
}

impl std::error::Error for UnknownRegistry {}
