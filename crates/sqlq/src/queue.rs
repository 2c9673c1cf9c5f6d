//! The task queue: an index-stable arena of tasks plus the two locks that
//! guard it.
//!
//! - The membership lock (`tasks`) covers structural changes: append on
//!   submission, unlink on reap. It is only held briefly.
//! - The pass lock is held by the worker for a whole scan-and-execute pass,
//!   and by shutdown while it discards tasks.
//!
//! Traversal works on a snapshot of `Arc`s, so an append or unlink during a
//! pass never invalidates the task being visited.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use concurrent_queue::ConcurrentQueue;
use parking_lot::{Mutex, MutexGuard};
use slab::Slab;

use crate::error::{Error, Result};
use crate::task::{AsyncTask, TaskId, TaskSpec};

pub(crate) struct TaskQueue {
    tasks: Mutex<Slab<Arc<AsyncTask>>>,
    pass: Mutex<()>,
    /// Tasks the worker has published as `Done`, in completion order.
    finished: ConcurrentQueue<Arc<AsyncTask>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl TaskQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        TaskQueue {
            tasks: Mutex::new(Slab::with_capacity(capacity)),
            pass: Mutex::new(()),
            finished: ConcurrentQueue::unbounded(),
            next_id: AtomicU64::new(0),
            capacity,
        }
    }

    /// Append a new task at the tail. Fails without side effects when the
    /// queue is at capacity.
    pub(crate) fn push(&self, spec: TaskSpec) -> Result<TaskId> {
        let mut tasks = self.tasks.lock();
        if tasks.len() >= self.capacity {
            return Err(Error::QueueFull {
                capacity: self.capacity,
            });
        }
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = tasks.vacant_entry();
        let key = entry.key();
        entry.insert(Arc::new(AsyncTask::new(id, key, spec)));
        Ok(id)
    }

    /// All live tasks in submission order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<AsyncTask>> {
        let mut tasks: Vec<_> = self.tasks.lock().iter().map(|(_, t)| t.clone()).collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    /// Unlink the task stored under `key`.
    pub(crate) fn remove(&self, key: usize) -> Option<Arc<AsyncTask>> {
        self.tasks.lock().try_remove(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub(crate) fn lock_pass(&self) -> MutexGuard<'_, ()> {
        self.pass.lock()
    }

    pub(crate) fn publish_finished(&self, task: Arc<AsyncTask>) {
        // Unbounded and never closed, so push cannot fail.
        let _ = self.finished.push(task);
    }

    pub(crate) fn pop_finished(&self) -> Option<Arc<AsyncTask>> {
        self.finished.pop().ok()
    }

    /// Drop every task, finished or not. Caller holds the pass lock.
    pub(crate) fn clear(&self) -> usize {
        while self.finished.pop().is_ok() {}
        let mut tasks = self.tasks.lock();
        let count = tasks.len();
        tasks.clear();
        count
    }
}
