//! C ABI exports for hosts that are not written in Rust.
//!
//! The host registers a [`HostVTable`] once, then wires the `sqlq_*`
//! builtins into its script VM. Builtins read their arguments from the
//! host's value stack and push their result onto it; failures are reported
//! through the host's error channel followed by an undefined result.
//!
//! The service and the registry are process-global. The service lock is
//! never held while host code runs: builtins clone the service out, release
//! the lock, then call into the host, so callbacks may submit new queries.

use std::sync::{Arc, OnceLock};

use parking_lot::{const_mutex, const_rwlock, Mutex, RwLock};

use crate::config::Config;
use crate::engine::query_sync;
use crate::error::Error;
use crate::host::{CallbackRef, ContextId, LivenessToken, ObjectId, ObjectRef, ObjectStore, ScriptHost};
use crate::registry::{DbHandle, HandleRegistry};
use crate::service::AsyncSqlite;
use crate::submit::{QueryRequest, SubmitMode};

/// Host callbacks. Argument readers return 1 and write `out` when the
/// argument at `index` exists and has the requested type, 0 otherwise.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct HostVTable {
    /// Writes the current execution context. Returns 0 while scripts are not running.
    pub current_context: extern "C" fn(out: *mut u32) -> u8,
    pub arg_int: extern "C" fn(index: u32, out: *mut i32) -> u8,
    pub arg_float: extern "C" fn(index: u32, out: *mut f32) -> u8,
    /// The string must stay valid until the builtin returns.
    pub arg_string: extern "C" fn(index: u32, out_ptr: *mut *const u8, out_len: *mut usize) -> u8,
    /// Writes three floats.
    pub arg_vector: extern "C" fn(index: u32, out: *mut f32) -> u8,
    pub arg_object: extern "C" fn(index: u32, out: *mut u32) -> u8,
    pub arg_function: extern "C" fn(index: u32, out: *mut u32) -> u8,

    pub push_int: extern "C" fn(value: i32),
    pub push_float: extern "C" fn(value: f32),
    /// Not NUL-terminated; the host copies the bytes.
    pub push_string: extern "C" fn(ptr: *const u8, len: usize),
    pub push_vector: extern "C" fn(value: *const f32),
    pub push_object: extern "C" fn(value: u32),
    pub push_undefined: extern "C" fn(),
    pub push_array: extern "C" fn(),
    pub push_array_last: extern "C" fn(),

    pub exec_thread: extern "C" fn(callback: u32, argc: u32),
    pub exec_object_thread: extern "C" fn(object: u32, callback: u32, argc: u32),
    pub report_error: extern "C" fn(ptr: *const u8, len: usize),

    /// Writes the object's liveness token. Returns 0 if the object does not exist.
    pub object_liveness: extern "C" fn(object: u32, out: *mut u32) -> u8,
}

static HOST: RwLock<Option<HostVTable>> = const_rwlock(None);
static SERVICE: Mutex<Option<Arc<AsyncSqlite>>> = const_mutex(None);
static REGISTRY: OnceLock<Arc<HandleRegistry>> = OnceLock::new();
static CONFIG: OnceLock<Config> = OnceLock::new();

fn registry() -> &'static Arc<HandleRegistry> {
    REGISTRY.get_or_init(|| Arc::new(HandleRegistry::new()))
}

fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

fn service() -> Option<Arc<AsyncSqlite>> {
    SERVICE.lock().clone()
}

/// [`ScriptHost`] and [`ObjectStore`] over a registered vtable, for the
/// duration of one builtin call. Errors reported through it carry the
/// builtin's name.
#[derive(Clone, Copy)]
struct FfiHost {
    vtable: HostVTable,
    builtin: &'static str,
}

impl ScriptHost for FfiHost {
    fn current_context(&self) -> Option<ContextId> {
        let mut out = 0;
        ((self.vtable.current_context)(&mut out) != 0).then_some(ContextId(out))
    }

    fn arg_int(&self, index: usize) -> Option<i32> {
        let mut out = 0;
        ((self.vtable.arg_int)(index as u32, &mut out) != 0).then_some(out)
    }

    fn arg_float(&self, index: usize) -> Option<f32> {
        let mut out = 0.0;
        ((self.vtable.arg_float)(index as u32, &mut out) != 0).then_some(out)
    }

    fn arg_string(&self, index: usize) -> Option<String> {
        let mut ptr = std::ptr::null();
        let mut len = 0;
        if (self.vtable.arg_string)(index as u32, &mut ptr, &mut len) == 0 || ptr.is_null() {
            return None;
        }
        // The host guarantees `ptr..ptr+len` is readable for this call.
        let bytes = unsafe { std::slice::from_raw_parts(ptr, len) };
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    fn arg_vector(&self, index: usize) -> Option<[f32; 3]> {
        let mut out = [0.0; 3];
        ((self.vtable.arg_vector)(index as u32, out.as_mut_ptr()) != 0).then_some(out)
    }

    fn arg_object(&self, index: usize) -> Option<ObjectRef> {
        let mut out = 0;
        ((self.vtable.arg_object)(index as u32, &mut out) != 0).then_some(ObjectRef(out))
    }

    fn arg_function(&self, index: usize) -> Option<CallbackRef> {
        let mut out = 0;
        ((self.vtable.arg_function)(index as u32, &mut out) != 0).then_some(CallbackRef(out))
    }

    fn push_int(&mut self, value: i32) {
        (self.vtable.push_int)(value)
    }

    fn push_float(&mut self, value: f32) {
        (self.vtable.push_float)(value)
    }

    fn push_string(&mut self, value: &str) {
        (self.vtable.push_string)(value.as_ptr(), value.len())
    }

    fn push_vector(&mut self, value: [f32; 3]) {
        (self.vtable.push_vector)(value.as_ptr())
    }

    fn push_object(&mut self, value: ObjectRef) {
        (self.vtable.push_object)(value.0)
    }

    fn push_undefined(&mut self) {
        (self.vtable.push_undefined)()
    }

    fn push_array(&mut self) {
        (self.vtable.push_array)()
    }

    fn push_array_last(&mut self) {
        (self.vtable.push_array_last)()
    }

    fn exec_thread(&mut self, callback: CallbackRef, argc: usize) {
        (self.vtable.exec_thread)(callback.0, argc as u32)
    }

    fn exec_object_thread(&mut self, target: ObjectId, callback: CallbackRef, argc: usize) {
        (self.vtable.exec_object_thread)(target.0, callback.0, argc as u32)
    }

    fn report_error(&mut self, message: &str) {
        let message = format!("{}() {message}", self.builtin);
        (self.vtable.report_error)(message.as_ptr(), message.len())
    }
}

impl ObjectStore for FfiHost {
    fn liveness(&self, id: ObjectId) -> Option<LivenessToken> {
        let mut out = 0;
        ((self.vtable.object_liveness)(id.0, &mut out) != 0).then_some(LivenessToken(out))
    }
}

fn with_host(builtin: &'static str, f: impl FnOnce(&mut FfiHost)) {
    let Some(vtable) = *HOST.read() else {
        tracing::warn!(builtin, "called before a host was registered");
        return;
    };
    f(&mut FfiHost { vtable, builtin });
}

fn fail(host: &mut FfiHost, err: &Error) {
    host.report_error(&err.to_string());
    host.push_undefined();
}

// ── Host ────────────────────────────────────────────────────────────

/// Register the host's callbacks. Returns 0=ok, -1=null vtable.
///
/// # Safety
///
/// `vtable` must be null or point to a valid [`HostVTable`]. Its functions
/// must remain callable for the rest of the process and are only invoked
/// from the thread that calls the `sqlq_*` builtins.
#[no_mangle]
pub unsafe extern "C" fn sqlq_register_host(vtable: *const HostVTable) -> i32 {
    if vtable.is_null() {
        return -1;
    }
    *HOST.write() = Some(*vtable);
    0
}

// ── Async queries ───────────────────────────────────────────────────

/// Start the background worker. Pushes 1; a repeated call is a no-op.
#[no_mangle]
pub extern "C" fn sqlq_async_initialize() {
    with_host("sqlq_async_initialize", |host| {
        let mut slot = SERVICE.lock();
        if slot.is_some() {
            tracing::debug!("async handler already initialized");
        } else {
            match AsyncSqlite::start(config().clone(), registry().clone()) {
                Ok(service) => *slot = Some(Arc::new(service)),
                Err(err) => {
                    drop(slot);
                    return fail(host, &err);
                }
            }
        }
        drop(slot);
        host.push_int(1);
    })
}

fn submit_builtin(builtin: &'static str, mode: SubmitMode) {
    with_host(builtin, |host| {
        let request = match QueryRequest::from_host(&*host, mode, config().max_string_len) {
            Ok(request) => request,
            Err(err) => return fail(host, &err),
        };
        let Some(service) = service() else {
            return fail(host, &Error::NotRunning);
        };
        match service.submit(request, &*host) {
            Ok(_) => host.push_int(1),
            Err(err) => fail(host, &err),
        }
    })
}

/// `(handle, query, callback?, arg?)`: run a query and pass its rows to `callback`.
#[no_mangle]
pub extern "C" fn sqlq_async_query() {
    submit_builtin("sqlq_async_query", SubmitMode::QUERY)
}

/// Like [`sqlq_async_query`] but discards rows.
#[no_mangle]
pub extern "C" fn sqlq_async_query_nosave() {
    submit_builtin("sqlq_async_query_nosave", SubmitMode::QUERY_NOSAVE)
}

/// Like [`sqlq_async_query`], running `callback` as a method on `object`.
#[no_mangle]
pub extern "C" fn sqlq_async_entity_query(object: u32) {
    submit_builtin("sqlq_async_entity_query", SubmitMode::object_query(ObjectId(object)))
}

#[no_mangle]
pub extern "C" fn sqlq_async_entity_query_nosave(object: u32) {
    submit_builtin(
        "sqlq_async_entity_query_nosave",
        SubmitMode::object_query_nosave(ObjectId(object)),
    )
}

/// Deliver finished queries. Call once per host frame.
#[no_mangle]
pub extern "C" fn sqlq_async_checkdone() {
    let Some(service) = service() else {
        return;
    };
    with_host("sqlq_async_checkdone", |host| {
        let objects = *host;
        service.drain_completions(host, &objects);
    })
}

// ── Databases ───────────────────────────────────────────────────────

/// `(path)`: open a database. Pushes its handle.
#[no_mangle]
pub extern "C" fn sqlq_open() {
    with_host("sqlq_open", |host| {
        let Some(path) = host.arg_string(0) else {
            return fail(host, &Error::InvalidArguments);
        };
        match registry().open(&path) {
            Ok(handle) => host.push_int(handle.as_raw()),
            Err(err) => fail(host, &err),
        }
    })
}

/// `(handle, query)`: run a query on the calling thread. Pushes the rows.
#[no_mangle]
pub extern "C" fn sqlq_query() {
    with_host("sqlq_query", |host| {
        let (Some(handle), Some(query)) = (host.arg_int(0), host.arg_string(1)) else {
            return fail(host, &Error::InvalidArguments);
        };
        match query_sync(registry(), DbHandle::from_raw(handle), &query, config()) {
            Ok(rows) => host.push_grid(&rows),
            Err(err) => fail(host, &err),
        }
    })
}

/// `(handle)`: close a database. Pushes 1.
#[no_mangle]
pub extern "C" fn sqlq_close() {
    with_host("sqlq_close", |host| {
        let Some(handle) = host.arg_int(0) else {
            return fail(host, &Error::InvalidArguments);
        };
        match registry().close(DbHandle::from_raw(handle)) {
            Ok(()) => host.push_int(1),
            Err(err) => fail(host, &err),
        }
    })
}

/// Process teardown: stop the worker, discard all tasks without callbacks
/// and close every database.
#[no_mangle]
pub extern "C" fn sqlq_shutdown() {
    let service = SERVICE.lock().take();
    match service {
        Some(service) => service.shutdown(),
        None => {
            registry().close_all();
        }
    }
}
