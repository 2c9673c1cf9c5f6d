//! Error type shared by submission, the handle registry and the engine adapter.

use std::io;

use crate::host::ObjectId;
use crate::registry::DbHandle;

/// Errors surfaced by the query service.
///
/// Submission-time variants (`InvalidArguments`, `NoContext`, `NotRunning`,
/// `QueueFull`, `UnknownTarget`) are returned synchronously and no task is created.
/// `Query` and `Timeout` are produced on the worker thread and only ever
/// reach the host through the completion drain.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A mandatory argument is missing or has the wrong type.
    #[error("one or more arguments is undefined or has a wrong type")]
    InvalidArguments,

    /// A script submission arrived while no execution context was active.
    #[error("no script execution context is active")]
    NoContext,

    /// The background worker has not been started, or was shut down.
    #[error("async handler has not been initialized")]
    NotRunning,

    /// Outstanding task count is at capacity.
    #[error("exceeded async task limit ({capacity})")]
    QueueFull { capacity: usize },

    /// An object-bound submission named an object the store cannot resolve.
    #[error("target object {0:?} does not exist")]
    UnknownTarget(ObjectId),

    /// The handle is not (or no longer) in the registry.
    #[error("unknown database handle {0}")]
    UnknownHandle(DbHandle),

    #[error("cannot open database '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cannot close database {handle}: {source}")]
    Close {
        handle: DbHandle,
        #[source]
        source: rusqlite::Error,
    },

    /// The engine rejected or failed the statement.
    #[error("query error in '{query}' - '{message}'")]
    Query { query: String, message: String },

    /// The engine stayed busy past the busy timeout.
    #[error("query timeout in '{query}' - '{message}'")]
    Timeout { query: String, message: String },

    #[error("error creating async handler thread: {0}")]
    Spawn(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
