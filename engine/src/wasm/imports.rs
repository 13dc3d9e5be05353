//! Guest import whitelist (spec §4.4, §4.7): one shim per execution-context operation a guest
//! module is allowed to call, mirroring the upstream WASM bridge's `context_*` function set
//! (`context_add`/`context_remove`/`context_get`/`context_update`/`context_has`/
//! `context_generate`/`context_parent`/`context_same`/`context_action`).
//!
//! A component's payload crossing the guest boundary is represented as a raw byte buffer rather
//! than a concrete Rust type — a type-erased runtime has no way to know a guest-declared
//! component's native layout, so any component touched from WASM is registered with
//! `ComponentDesc::new::<Vec<u8>>` and these shims read/write exactly `ComponentDesc::size()`
//! bytes at the guest-supplied offset, matching the upstream bridge's `memcpy`-through-a-raw-
//! pointer approach for POD component structs.

use wasmtime::{Caller, FuncType, Linker, Memory, ValType};

use crate::id::ComponentId;
use crate::system::context::{ExecutionContext, ParentHandle};

use super::HostState;

/// The fixed set of guest imports this host will link, keyed by `(module, name)`. Anything not
/// in this list is rejected at load time (spec §4.7 "restricted to a whitelist").
const WHITELIST: &[&str] = &[
    "context_add",
    "context_remove",
    "context_get",
    "context_update",
    "context_has",
    "context_generate",
    "context_parent",
    "context_same",
    "context_action",
];

pub fn lookup(module: &str, name: &str) -> Option<&'static str> {
    if module != "ecsact" {
        return None;
    }
    WHITELIST.iter().copied().find(|&known| known == name)
}

/// `(param count, result count)` a whitelisted op's guest-side declaration must match. Every
/// param and result is `i32` (spec §4.7: the guest ABI carries only opaque handles, ids, and
/// linear-memory offsets, never a richer wasm value type).
fn expected_arity(name: &str) -> Option<(usize, usize)> {
    Some(match name {
        "context_add" => (3, 0),
        "context_remove" => (2, 0),
        "context_get" => (3, 0),
        "context_update" => (3, 0),
        "context_has" => (2, 1),
        "context_generate" => (4, 1),
        "context_parent" => (3, 1),
        "context_same" => (2, 1),
        "context_action" => (3, 1),
        _ => return None,
    })
}

/// Whether a guest's declared type for a whitelisted import matches the shim it would be linked
/// against. A name can only pass [`lookup`] and still fail this check (spec §4.7 "every declared
/// import must be in the whitelist with the correct signature"), which is what separates
/// `GuestImportUnknown` from `GuestImportInvalid`.
pub fn signature_matches(name: &str, ty: &FuncType) -> bool {
    let Some((params, results)) = expected_arity(name) else {
        return false;
    };
    ty.params().len() == params
        && ty.params().all(|p| matches!(p, ValType::I32))
        && ty.results().len() == results
        && ty.results().all(|r| matches!(r, ValType::I32))
}

/// Resolve a guest `i32` handle back to the `ExecutionContext` it was issued for this call.
///
/// # Safety
/// The handle was inserted by [`super::Host::dispatch`] immediately before this guest call and
/// is freed immediately after it returns, so the pointer is valid for the guest call's duration
/// and the context's borrowed lifetime never actually outlives its real caller.
unsafe fn resolve<'a>(caller: &Caller<'_, HostState>, handle: i32) -> Option<&'a mut ExecutionContext<'a>> {
    let ptr = caller.data().handles.resolve(handle)? as *mut ExecutionContext<'a>;
    Some(unsafe { &mut *ptr })
}

fn memory_of(caller: &mut Caller<'_, HostState>) -> Option<Memory> {
    caller.get_export("memory").and_then(|export| export.into_memory())
}

fn read_bytes(caller: &mut Caller<'_, HostState>, offset: i32, len: usize) -> Option<Vec<u8>> {
    let memory = memory_of(caller)?;
    let data = memory.data(caller);
    let start = offset as usize;
    data.get(start..start + len).map(|slice| slice.to_vec())
}

fn write_bytes(caller: &mut Caller<'_, HostState>, offset: i32, bytes: &[u8]) -> bool {
    let Some(memory) = memory_of(caller) else {
        return false;
    };
    let start = offset as usize;
    let data = memory.data_mut(caller);
    match data.get_mut(start..start + bytes.len()) {
        Some(dest) => {
            dest.copy_from_slice(bytes);
            true
        }
        None => false,
    }
}

pub fn link_all(linker: &mut Linker<HostState>) -> Result<(), String> {
    linker
        .func_wrap("ecsact", "context_add", context_add)
        .and_then(|l| l.func_wrap("ecsact", "context_remove", context_remove))
        .and_then(|l| l.func_wrap("ecsact", "context_get", context_get))
        .and_then(|l| l.func_wrap("ecsact", "context_update", context_update))
        .and_then(|l| l.func_wrap("ecsact", "context_has", context_has))
        .and_then(|l| l.func_wrap("ecsact", "context_generate", context_generate))
        .and_then(|l| l.func_wrap("ecsact", "context_parent", context_parent))
        .and_then(|l| l.func_wrap("ecsact", "context_same", context_same))
        .and_then(|l| l.func_wrap("ecsact", "context_action", context_action))
        .map(|_| ())
        .map_err(|err| err.to_string())
}

/// `context_add(ctx, component, data_ptr)` (spec §4.4 `add<C>(v)`).
fn context_add(mut caller: Caller<'_, HostState>, ctx: i32, component: i32, data_ptr: i32) {
    let component = ComponentId::new(component as u32);
    let Some(ctx_ref) = (unsafe { resolve(&caller, ctx) }) else { return };
    let Some(size) = ctx_ref.component_desc(component).map(|desc| desc.size()) else {
        return;
    };
    let Some(bytes) = read_bytes(&mut caller, data_ptr, size) else {
        return;
    };
    ctx_ref.add::<Vec<u8>>(component, bytes);
}

/// `context_remove(ctx, component)` (spec §4.4 `remove<C>()`).
fn context_remove(caller: Caller<'_, HostState>, ctx: i32, component: i32) {
    let component = ComponentId::new(component as u32);
    if let Some(ctx_ref) = unsafe { resolve(&caller, ctx) } {
        ctx_ref.remove(component);
    }
}

/// `context_get(ctx, component, out_ptr)` (spec §4.4 `get<C>()`).
fn context_get(mut caller: Caller<'_, HostState>, ctx: i32, component: i32, out_ptr: i32) {
    let component = ComponentId::new(component as u32);
    let Some(ctx_ref) = (unsafe { resolve(&caller, ctx) }) else { return };
    let Some(value) = ctx_ref.get::<Vec<u8>>(component) else {
        return;
    };
    let bytes = value.clone();
    write_bytes(&mut caller, out_ptr, &bytes);
}

/// `context_update(ctx, component, data_ptr)` (spec §4.4 `update<C>(v)`).
fn context_update(mut caller: Caller<'_, HostState>, ctx: i32, component: i32, data_ptr: i32) {
    let component = ComponentId::new(component as u32);
    let Some(ctx_ref) = (unsafe { resolve(&caller, ctx) }) else { return };
    let Some(size) = ctx_ref.component_desc(component).map(|desc| desc.size()) else {
        return;
    };
    let Some(bytes) = read_bytes(&mut caller, data_ptr, size) else {
        return;
    };
    ctx_ref.update::<Vec<u8>>(component, bytes);
}

/// `context_has(ctx, component) -> bool` (spec §4.4 `has<C>()`).
fn context_has(caller: Caller<'_, HostState>, ctx: i32, component: i32) -> i32 {
    let component = ComponentId::new(component as u32);
    match unsafe { resolve(&caller, ctx) } {
        Some(ctx_ref) => i32::from(ctx_ref.has(component)),
        None => 0,
    }
}

/// `context_generate(ctx, ids_ptr, count, data_ptrs_ptr) -> entity` (spec §4.4 `generate`).
/// `ids_ptr` is `count` packed `i32` component ids; `data_ptrs_ptr` is `count` packed `i32` guest
/// offsets, one component-sized buffer per id, in the same order.
fn context_generate(mut caller: Caller<'_, HostState>, ctx: i32, ids_ptr: i32, count: i32, data_ptrs_ptr: i32) -> i32 {
    let Some(ids_bytes) = read_bytes(&mut caller, ids_ptr, count as usize * 4) else {
        return -1;
    };
    let Some(ptrs_bytes) = read_bytes(&mut caller, data_ptrs_ptr, count as usize * 4) else {
        return -1;
    };

    let mut components = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let id = i32::from_le_bytes(ids_bytes[i * 4..i * 4 + 4].try_into().unwrap());
        let offset = i32::from_le_bytes(ptrs_bytes[i * 4..i * 4 + 4].try_into().unwrap());
        let component = ComponentId::new(id as u32);

        let Some(ctx_ref) = (unsafe { resolve(&caller, ctx) }) else { return -1 };
        let Some(size) = ctx_ref.component_desc(component).map(|desc| desc.size()) else {
            return -1;
        };
        let Some(bytes) = read_bytes(&mut caller, offset, size) else {
            return -1;
        };
        components.push((component, Box::new(bytes) as Box<dyn std::any::Any + Send + Sync>));
    }

    match unsafe { resolve(&caller, ctx) } {
        Some(ctx_ref) => ctx_ref.generate(components).index() as i32,
        None => -1,
    }
}

/// `context_parent(ctx, out_system_ptr, out_entity_ptr) -> bool` (spec §4.4 `parent()`).
fn context_parent(mut caller: Caller<'_, HostState>, ctx: i32, out_system_ptr: i32, out_entity_ptr: i32) -> i32 {
    let parent = match unsafe { resolve(&caller, ctx) } {
        Some(ctx_ref) => ctx_ref.parent(),
        None => None,
    };
    match parent {
        Some(ParentHandle { system, entity }) => {
            write_bytes(&mut caller, out_system_ptr, &(system.index() as i32).to_le_bytes());
            write_bytes(&mut caller, out_entity_ptr, &(entity.index() as i32).to_le_bytes());
            1
        }
        None => 0,
    }
}

/// `context_same(ctx_a, ctx_b) -> bool` (spec §4.4 `same(other)`).
fn context_same(caller: Caller<'_, HostState>, ctx_a: i32, ctx_b: i32) -> i32 {
    let a = unsafe { resolve(&caller, ctx_a) };
    let b = unsafe { resolve(&caller, ctx_b) };
    match (a, b) {
        (Some(a), Some(b)) => i32::from(a.same(b)),
        _ => 0,
    }
}

/// `context_action(ctx, out_ptr, out_len) -> bytes written, or -1 if this isn't an action
/// invocation` (spec §4.4 `action()`). The payload is represented the same way component
/// payloads are: a raw `Vec<u8>` the caller boxed when building the `ActionInvocation`.
fn context_action(mut caller: Caller<'_, HostState>, ctx: i32, out_ptr: i32, out_len: i32) -> i32 {
    let Some(ctx_ref) = (unsafe { resolve(&caller, ctx) }) else {
        return -1;
    };
    let Some(payload) = ctx_ref.action::<Vec<u8>>() else {
        return -1;
    };
    let bytes = payload.clone();
    let written = bytes.len().min(out_len.max(0) as usize);
    if write_bytes(&mut caller, out_ptr, &bytes[..written]) {
        written as i32
    } else {
        -1
    }
}
