//! Per-component storage: the dense sparse-set primitive (spec §3, §4.2) and its type-erased
//! wrapper so a registry can hold one per [`ComponentId`](crate::id::ComponentId).

pub mod erased;
pub mod sparse_set;

pub use erased::ErasedStorage;
pub use sparse_set::SparseSet;
