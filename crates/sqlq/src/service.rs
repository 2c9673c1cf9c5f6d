//! The async query service: owns the worker thread and the task queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::config::{truncate_to, Config};
use crate::drain;
use crate::error::{Error, Result};
use crate::host::{ObjectStore, ScriptHost};
use crate::queue::TaskQueue;
use crate::registry::HandleRegistry;
use crate::submit::{QueryRequest, SubmitMode};
use crate::task::{TargetBinding, TaskId, TaskSpec};
use crate::variant::Value;
use crate::worker;

/// State shared between the host-facing handle and the worker thread.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) queue: TaskQueue,
    pub(crate) registry: Arc<HandleRegistry>,
    pub(crate) running: AtomicBool,
}

/// Runs queries on a background thread and hands results back on the
/// host's thread through [`drain_completions`](Self::drain_completions).
pub struct AsyncSqlite {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncSqlite {
    /// Start the worker thread.
    pub fn start(config: Config, registry: Arc<HandleRegistry>) -> Result<Self> {
        let shared = Arc::new(Shared {
            queue: TaskQueue::new(config.max_tasks),
            config,
            registry,
            running: AtomicBool::new(true),
        });
        let worker = worker::spawn(shared.clone()).map_err(Error::Spawn)?;
        Ok(AsyncSqlite {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.shared.registry
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Tasks currently owned by the queue, in any state.
    pub fn outstanding(&self) -> usize {
        self.shared.queue.len()
    }

    /// Queue a query. Returns immediately; execution is always asynchronous.
    ///
    /// For object-bound requests the target's liveness token is captured now
    /// and checked again before the callback runs.
    pub fn submit<O: ObjectStore + ?Sized>(&self, request: QueryRequest, objects: &O) -> Result<TaskId> {
        if !self.is_running() {
            return Err(Error::NotRunning);
        }

        let target = match request.target {
            Some(object) => {
                let token = objects.liveness(object).ok_or(Error::UnknownTarget(object))?;
                Some(TargetBinding { object, token })
            }
            None => None,
        };

        let max = self.shared.config.max_string_len;
        let passthrough = request.passthrough.map(|value| match value {
            Value::String(s) => Value::String(truncate_to(s, max)),
            other => other,
        });

        let id = self.shared.queue.push(TaskSpec {
            handle: request.handle,
            query: truncate_to(request.query, max),
            callback: request.callback,
            save: request.save,
            context: request.context,
            target,
            passthrough,
        })?;
        tracing::trace!(task = id.0, handle = %request.handle, "queued query");
        Ok(id)
    }

    /// Read a submission from the current script call and queue it.
    pub fn submit_from_host<H, O>(&self, host: &H, objects: &O, mode: SubmitMode) -> Result<TaskId>
    where
        H: ScriptHost + ?Sized,
        O: ObjectStore + ?Sized,
    {
        let request = QueryRequest::from_host(host, mode, self.shared.config.max_string_len)?;
        self.submit(request, objects)
    }

    /// Deliver finished tasks. Call once per host tick, on the host thread.
    /// Returns the number of callbacks invoked.
    pub fn drain_completions<H, O>(&self, host: &mut H, objects: &O) -> usize
    where
        H: ScriptHost + ?Sized,
        O: ObjectStore + ?Sized,
    {
        drain::drain(&self.shared.queue, host, objects)
    }

    /// Stop the worker, discard every task without running callbacks, and
    /// close every registered database. Later submissions fail with
    /// [`Error::NotRunning`].
    pub fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(worker) = self.worker.lock().take() {
            worker.thread().unpark();
            if worker.join().is_err() {
                tracing::warn!("async query worker panicked");
            }
        }

        let _pass = self.shared.queue.lock_pass();
        let tasks = self.shared.queue.clear();
        let handles = self.shared.registry.close_all();
        tracing::debug!(tasks, handles, "async query service shut down");
    }
}

impl Drop for AsyncSqlite {
    fn drop(&mut self) {
        self.shutdown();
    }
}
