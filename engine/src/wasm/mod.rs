//! The WASM system-impl host (spec §4.7): loads one `wasmtime` module per system, resolves and
//! validates every declared import against a fixed whitelist, and dispatches guest calls for the
//! scheduler through [`WasmDispatch`](crate::schedule::WasmDispatch).
//!
//! Built on `wasmtime` with the `cranelift` backend per spec §10.5: one [`Store`] per loaded
//! system so bodies never share linear memory, and a `dashmap`-backed handle table ([`handles`])
//! guarded implicitly by its internal sharding rather than a single lock, since loads and trap
//! deliveries may touch it from a different thread than the one dispatching a call.

mod handles;
mod imports;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use log::debug;
use wasmtime::{Config, Engine, ExternType, Instance, Linker, Module, Store, TypedFunc};

use crate::id::SystemId;
use crate::schedule::WasmDispatch;
use crate::system::context::ExecutionContext;

use handles::HandleTable;

/// Mirrors the `ErrorCode` enum (spec §6): every load failure is typed so a caller never has to
/// string-match a message to react to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    FileOpenFail,
    FileReadFail,
    CompileFail(String),
    InstantiateFail(String),
    ExportNotFound(String),
    ExportInvalid(String),
    GuestImportUnknown(String),
    GuestImportInvalid(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::FileOpenFail => write!(f, "failed to open WASM module file"),
            LoadError::FileReadFail => write!(f, "failed to read WASM module file"),
            LoadError::CompileFail(msg) => write!(f, "WASM module failed to compile: {msg}"),
            LoadError::InstantiateFail(msg) => write!(f, "WASM module failed to instantiate: {msg}"),
            LoadError::ExportNotFound(name) => write!(f, "export not found: {name}"),
            LoadError::ExportInvalid(name) => write!(f, "export has the wrong signature: {name}"),
            LoadError::GuestImportUnknown(name) => write!(f, "guest imports unknown host function: {name}"),
            LoadError::GuestImportInvalid(name) => write!(f, "guest import has the wrong signature: {name}"),
        }
    }
}

impl std::error::Error for LoadError {}

/// A guest trap captured during dispatch, keyed by the system whose body trapped (spec §4.7
/// "If the guest traps, the host captures the trap message").
#[derive(Debug, Clone)]
pub struct TrapError {
    pub system: SystemId,
    pub message: String,
}

impl fmt::Display for TrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system {} trapped: {}", self.system, self.message)
    }
}

impl std::error::Error for TrapError {}

type TrapHandler = Box<dyn Fn(&TrapError) + Send + Sync>;

/// Per-`Store` data: just a handle to the shared guest/host pointer table, so import shims can
/// resolve a guest `i32` back to the [`ExecutionContext`] it was issued for.
#[derive(Clone)]
struct HostState {
    handles: Arc<HandleTable>,
}

struct LoadedSystem {
    store: Mutex<Store<HostState>>,
    #[allow(dead_code)]
    instance: Instance,
    export: TypedFunc<i32, ()>,
}

/// Owns one `wasmtime::Store` per loaded system, the guest/host handle table, and an optional
/// trap handler. Implements [`WasmDispatch`] so the scheduler can route `Body::Wasm` systems
/// through it without a compile-time dependency on `wasmtime`.
pub struct Host {
    engine: Engine,
    systems: Mutex<HashMap<SystemId, LoadedSystem>>,
    handles: Arc<HandleTable>,
    trap_handler: Mutex<Option<TrapHandler>>,
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl Host {
    /// No config: each load uses the engine's defaults (no SIMD/threads proposals enabled),
    /// matching the minimal, sandbox-biased posture of spec §4.7/§10.5.
    pub fn new() -> Self {
        let mut config = Config::new();
        config.wasm_simd(false);
        config.wasm_relaxed_simd(false);
        config.wasm_threads(false);
        let engine = Engine::new(&config).expect("default wasmtime engine configuration is always valid");
        Self {
            engine,
            systems: Mutex::new(HashMap::new()),
            handles: Arc::new(HandleTable::new()),
            trap_handler: Mutex::new(None),
        }
    }

    /// Register a callback for guest traps (spec §4.7, §10.2 `wasm::TrapError` "delivered to a
    /// caller-registered handler closure rather than returned").
    pub fn set_trap_handler(&self, handler: impl Fn(&TrapError) + Send + Sync + 'static) {
        *self.trap_handler.lock().expect("wasm host trap handler lock poisoned") = Some(Box::new(handler));
    }

    /// Load a module declaring the given `(system, export name)` pairs, atomically: either every
    /// entry resolves and is installed, or none are (spec §4.7 "Load contract", §6 "WASM load
    /// atomicity", scenario S6).
    pub fn load(&self, bytes: &[u8], entries: &[(SystemId, String)]) -> Result<(), LoadError> {
        let module = Module::new(&self.engine, bytes).map_err(|err| LoadError::CompileFail(err.to_string()))?;

        // Resolve pass: validate every guest import is in the whitelist, and that its declared
        // signature matches the shim it would be linked against, before installing anything
        // (spec §4.7 "every declared import must be in the whitelist with the correct
        // signature"). A name passing `lookup` but failing the signature check is
        // `GuestImportInvalid`, not `GuestImportUnknown`.
        for import in module.imports() {
            let Some(known) = imports::lookup(import.module(), import.name()) else {
                return Err(LoadError::GuestImportUnknown(format!("{}.{}", import.module(), import.name())));
            };
            match import.ty() {
                ExternType::Func(func_ty) if imports::signature_matches(known, &func_ty) => {}
                _ => return Err(LoadError::GuestImportInvalid(format!("{}.{}", import.module(), import.name()))),
            }
        }

        let mut resolved = Vec::with_capacity(entries.len());
        for (system, export_name) in entries {
            let mut store = Store::new(
                &self.engine,
                HostState {
                    handles: self.handles.clone(),
                },
            );
            let mut linker = Linker::new(&self.engine);
            imports::link_all(&mut linker).expect("link_all registers a fixed, non-colliding import set");
            let instance = linker
                .instantiate(&mut store, &module)
                .map_err(|err| LoadError::InstantiateFail(err.to_string()))?;
            let export = match instance.get_export(&mut store, export_name) {
                None => return Err(LoadError::ExportNotFound(export_name.clone())),
                Some(extern_) => match extern_.into_func() {
                    None => return Err(LoadError::ExportInvalid(export_name.clone())),
                    Some(func) => func
                        .typed::<i32, ()>(&store)
                        .map_err(|_| LoadError::ExportInvalid(export_name.clone()))?,
                },
            };
            resolved.push((
                *system,
                LoadedSystem {
                    store: Mutex::new(store),
                    instance,
                    export,
                },
            ));
        }

        // Install pass: only now does the batch touch shared state, so a failure above never
        // partially installs entries before it (spec §6 bullet 3, S6).
        let mut systems = self.systems.lock().expect("wasm host systems lock poisoned");
        for (system, loaded) in resolved {
            debug!("wasm host: installed system {system}");
            systems.insert(system, loaded);
        }
        Ok(())
    }
}

impl WasmDispatch for Host {
    fn dispatch(&self, system: SystemId, ctx: &mut ExecutionContext) -> Result<(), String> {
        let systems = self.systems.lock().expect("wasm host systems lock poisoned");
        let loaded = systems
            .get(&system)
            .ok_or_else(|| format!("no WASM implementation installed for system {system}"))?;
        let mut store = loaded.store.lock().expect("wasm store lock poisoned");

        // The guest only ever sees an opaque i32; import shims resolve it back through
        // `self.handles` for the lifetime of this call (spec §4.7 "Handle mapping"). The handle
        // is inserted and freed within this single call and never escapes it, so reconstituting
        // `ExecutionContext`'s borrowed lifetime on the other side of the guest boundary is sound.
        let ctx_ptr: *mut ExecutionContext<'static> = unsafe { std::mem::transmute(ctx as *mut ExecutionContext) };
        let handle = self.handles.insert(ctx_ptr as *mut ());
        let result = loaded.export.call(&mut *store, handle);
        self.handles.free(handle);

        result.map_err(|trap| {
            let message = trap.to_string();
            if let Some(handler) = self
                .trap_handler
                .lock()
                .expect("wasm host trap handler lock poisoned")
                .as_ref()
            {
                handler(&TrapError {
                    system,
                    message: message.clone(),
                });
            }
            message
        })
    }
}
