//! One submitted query and its lifecycle.
//!
//! State moves `Pending -> Running -> Done -> Complete`, with `Running ->
//! Pending` when the engine reports busy. The worker is the only writer up to
//! `Done`; the drain is the only writer of `Complete`. Both transitions are
//! published with release stores and observed with acquire loads, so the
//! drain sees the full outcome once it sees `Done`, and the worker sees no
//! further drain activity once it sees `Complete`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::engine::ResultGrid;
use crate::error::Error;
use crate::host::{CallbackRef, ContextId, LivenessToken, ObjectId};
use crate::registry::DbHandle;
use crate::variant::Value;

/// Submission-order identifier returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TaskState {
    Pending = 0,
    Running = 1,
    Done = 2,
    Complete = 3,
}

impl TaskState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskState::Pending,
            1 => TaskState::Running,
            2 => TaskState::Done,
            _ => TaskState::Complete,
        }
    }
}

/// Object a callback is bound to, and its liveness token at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetBinding {
    pub object: ObjectId,
    pub token: LivenessToken,
}

/// Worker-side execution record.
#[derive(Default)]
struct Execution {
    /// When the first prepare was attempted; the busy timeout counts from here.
    first_attempt: Option<Instant>,
    /// Set once, right before the task is published as `Done`.
    outcome: Option<Result<ResultGrid, Error>>,
}

pub(crate) struct AsyncTask {
    pub(crate) id: TaskId,
    /// Slab key in the owning queue.
    pub(crate) key: usize,
    pub(crate) handle: DbHandle,
    pub(crate) query: String,
    pub(crate) callback: Option<CallbackRef>,
    pub(crate) save: bool,
    pub(crate) context: ContextId,
    pub(crate) target: Option<TargetBinding>,
    pub(crate) passthrough: Option<Value>,
    state: AtomicU8,
    execution: Mutex<Execution>,
}

/// Everything a task is created from, once validated.
pub(crate) struct TaskSpec {
    pub handle: DbHandle,
    pub query: String,
    pub callback: Option<CallbackRef>,
    pub save: bool,
    pub context: ContextId,
    pub target: Option<TargetBinding>,
    pub passthrough: Option<Value>,
}

impl AsyncTask {
    pub(crate) fn new(id: TaskId, key: usize, spec: TaskSpec) -> Self {
        AsyncTask {
            id,
            key,
            handle: spec.handle,
            query: spec.query,
            callback: spec.callback,
            save: spec.save,
            context: spec.context,
            target: spec.target,
            passthrough: spec.passthrough,
            state: AtomicU8::new(TaskState::Pending as u8),
            execution: Mutex::new(Execution::default()),
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Rows are only worth keeping if someone will receive them.
    pub(crate) fn captures_rows(&self) -> bool {
        self.save && self.callback.is_some()
    }

    /// Enter `Running`. Returns when the first attempt was made.
    pub(crate) fn begin_attempt(&self) -> Instant {
        self.state.store(TaskState::Running as u8, Ordering::Release);
        *self
            .execution
            .lock()
            .first_attempt
            .get_or_insert_with(Instant::now)
    }

    /// Back to `Pending` after a busy status.
    pub(crate) fn retry_later(&self) {
        self.state.store(TaskState::Pending as u8, Ordering::Release);
    }

    /// Record the outcome and publish `Done`.
    pub(crate) fn finish(&self, outcome: Result<ResultGrid, Error>) {
        self.execution.lock().outcome = Some(outcome);
        self.state.store(TaskState::Done as u8, Ordering::Release);
    }

    /// Take the outcome recorded by [`finish`](Self::finish). Only meaningful
    /// after observing `Done`.
    pub(crate) fn take_outcome(&self) -> Option<Result<ResultGrid, Error>> {
        self.execution.lock().outcome.take()
    }

    /// Hand the task back to the worker for reaping.
    pub(crate) fn mark_complete(&self) {
        self.state.store(TaskState::Complete as u8, Ordering::Release);
    }
}
