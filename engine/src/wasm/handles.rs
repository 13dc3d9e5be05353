//! Bijective `i32 <-> host pointer` table for the guest/host boundary (spec §4.7, §9).
//!
//! Guest imports only ever receive an opaque `i32`; this table is what turns that back into the
//! [`ExecutionContext`](crate::system::context::ExecutionContext) the call is bound to. It is
//! `dashmap`-backed rather than guarded by a single mutex, since loads and trap deliveries may
//! touch it from a different thread than the one dispatching a call (spec §9 "WASM guest ↔ host
//! pointers"), matching this codebase's existing concurrent type registry.

use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;

/// Guest-visible opaque handle. `0` is reserved for null (spec §4.7 "Handle mapping").
pub type Handle = i32;

#[derive(Default)]
pub struct HandleTable {
    next: AtomicI64,
    forward: DashMap<Handle, usize>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
            forward: DashMap::new(),
        }
    }

    /// Register `ptr` and return a fresh handle. Ids are never reused after [`Self::free`] (spec
    /// §9: "do not reuse ids across `free`").
    pub fn insert(&self, ptr: *mut ()) -> Handle {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let handle = i32::try_from(id).expect("wasm handle space exhausted");
        self.forward.insert(handle, ptr as usize);
        handle
    }

    pub fn resolve(&self, handle: Handle) -> Option<*mut ()> {
        if handle == 0 {
            return None;
        }
        self.forward.get(&handle).map(|entry| *entry as *mut ())
    }

    pub fn free(&self, handle: Handle) {
        self.forward.remove(&handle);
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_resolve_round_trips() {
        // Given
        let table = HandleTable::new();
        let mut value = 7u32;
        let ptr = &mut value as *mut u32 as *mut ();

        // When
        let handle = table.insert(ptr);

        // Then
        assert_ne!(handle, 0);
        assert_eq!(table.resolve(handle), Some(ptr));
    }

    #[test]
    fn free_removes_the_mapping() {
        // Given
        let table = HandleTable::new();
        let handle = table.insert(std::ptr::null_mut());

        // When
        table.free(handle);

        // Then
        assert_eq!(table.resolve(handle), None);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn zero_never_resolves() {
        let table = HandleTable::new();
        assert_eq!(table.resolve(0), None);
    }

    #[test]
    fn handles_are_not_reused_after_free() {
        // Given
        let table = HandleTable::new();
        let a = table.insert(std::ptr::null_mut());
        table.free(a);

        // When
        let b = table.insert(std::ptr::null_mut());

        // Then
        assert_ne!(a, b);
    }
}
