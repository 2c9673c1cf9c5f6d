//! sqlq: background SQLite queries for a single-threaded scripting host.
//!
//! A script submits a query with an optional callback and passthrough value.
//! The query runs on a dedicated worker thread; once per host tick the host
//! calls [`AsyncSqlite::drain_completions`], which invokes callbacks for
//! finished queries on the host's own thread. Results whose execution context
//! has gone away, or whose target object has been destroyed, are dropped.
//!
//! The host side is abstracted by [`ScriptHost`] and [`ObjectStore`]. Hosts
//! written in C use the exports in [`ffi`] instead.

mod config;
mod drain;
mod engine;
mod error;
pub mod ffi;
mod host;
mod queue;
mod registry;
mod service;
mod submit;
mod task;
mod variant;
mod worker;

pub use config::{Config, GridLimits};
pub use engine::{query_sync, ResultGrid};
pub use error::{Error, Result};
pub use host::{CallbackRef, ContextId, LivenessToken, ObjectId, ObjectRef, ObjectStore, ScriptHost};
pub use registry::{DbHandle, HandleRegistry};
pub use service::AsyncSqlite;
pub use submit::{QueryRequest, SubmitMode};
pub use task::{TaskId, TaskState};
pub use variant::Value;
