//! Building a task submission, either directly or from a script call's
//! arguments.

use crate::error::{Error, Result};
use crate::host::{CallbackRef, ContextId, ObjectId, ScriptHost};
use crate::registry::DbHandle;
use crate::variant::Value;

/// The two axes the script-facing query builtins differ on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitMode {
    /// Keep row results for the callback.
    pub save: bool,
    /// Run the callback as a method on this object.
    pub target: Option<ObjectId>,
}

impl SubmitMode {
    pub const QUERY: SubmitMode = SubmitMode {
        save: true,
        target: None,
    };

    pub const QUERY_NOSAVE: SubmitMode = SubmitMode {
        save: false,
        target: None,
    };

    pub fn object_query(target: ObjectId) -> Self {
        SubmitMode {
            save: true,
            target: Some(target),
        }
    }

    pub fn object_query_nosave(target: ObjectId) -> Self {
        SubmitMode {
            save: false,
            target: Some(target),
        }
    }
}

/// A query to run in the background.
///
/// ```
/// use sqlq::{CallbackRef, ContextId, DbHandle, QueryRequest, Value};
///
/// let request = QueryRequest::new(DbHandle(1), "SELECT name FROM players", ContextId(1))
///     .callback(CallbackRef(7))
///     .passthrough(Value::Int(3));
/// assert!(request.save);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub handle: DbHandle,
    pub query: String,
    pub callback: Option<CallbackRef>,
    pub passthrough: Option<Value>,
    pub save: bool,
    pub target: Option<ObjectId>,
    /// Execution context the result belongs to. The result is dropped if
    /// the host has moved on to another context by the time it is drained.
    pub context: ContextId,
}

impl QueryRequest {
    pub fn new(handle: DbHandle, query: impl Into<String>, context: ContextId) -> Self {
        QueryRequest {
            handle,
            query: query.into(),
            callback: None,
            passthrough: None,
            save: true,
            target: None,
            context,
        }
    }

    pub fn callback(mut self, callback: CallbackRef) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn passthrough(mut self, value: Value) -> Self {
        self.passthrough = Some(value);
        self
    }

    pub fn nosave(mut self) -> Self {
        self.save = false;
        self
    }

    pub fn bound_to(mut self, target: ObjectId) -> Self {
        self.target = Some(target);
        self
    }

    /// Read a submission from the current script call: argument 0 is the
    /// handle, 1 the query, 2 an optional callback and 3 an optional
    /// passthrough value. The request belongs to the host's current context.
    pub fn from_host<H: ScriptHost + ?Sized>(
        host: &H,
        mode: SubmitMode,
        max_string_len: usize,
    ) -> Result<Self> {
        let (Some(handle), Some(query)) = (host.arg_int(0), host.arg_string(1)) else {
            return Err(Error::InvalidArguments);
        };
        let context = host.current_context().ok_or(Error::NoContext)?;
        Ok(QueryRequest {
            handle: DbHandle::from_raw(handle),
            query,
            callback: host.arg_function(2),
            passthrough: Value::probe(host, 3, max_string_len),
            save: mode.save,
            target: mode.target,
            context,
        })
    }
}
