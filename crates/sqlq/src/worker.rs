//! The background worker: one thread, one pass per poll interval.
//!
//! Each pass holds the queue's pass lock, runs every task that is not yet
//! `Done`, and reaps every task the drain has marked `Complete`.

use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::engine;
use crate::error::Error;
use crate::service::Shared;
use crate::task::{AsyncTask, TaskState};

pub(crate) fn spawn(shared: Arc<Shared>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("sqlq-worker".into())
        .spawn(move || run(&shared))
}

fn run(shared: &Shared) {
    tracing::debug!("async query worker started");
    while shared.running.load(Ordering::Acquire) {
        pass(shared);
        // Shutdown unparks us, so a stop request doesn't wait out the interval.
        thread::park_timeout(shared.config.poll_interval);
    }
    tracing::debug!("async query worker stopped");
}

/// One scan over the queue. Returns the number of tasks reaped.
pub(crate) fn pass(shared: &Shared) -> usize {
    let _pass = shared.queue.lock_pass();
    let mut reaped = 0;

    for task in shared.queue.snapshot() {
        if task.state() < TaskState::Done {
            execute(shared, &task);
        }

        if task.state() == TaskState::Complete {
            // Dropping the last Arc finalizes anything the task still owns.
            shared.queue.remove(task.key);
            tracing::trace!(task = task.id.0, "reaped task");
            reaped += 1;
        }
    }
    reaped
}

/// Run one task. A busy status leaves it pending for the next pass until the
/// busy timeout runs out; anything else finishes it.
fn execute(shared: &Shared, task: &Arc<AsyncTask>) {
    let first_attempt = task.begin_attempt();

    let Some(conn) = shared.registry.get(task.handle) else {
        finish(shared, task, Err(query_error(task, Error::UnknownHandle(task.handle).to_string())));
        return;
    };

    let result = engine::run_query(
        &conn.lock(),
        &task.query,
        task.captures_rows(),
        shared.config.limits(),
    );

    match result {
        Ok(rows) => finish(shared, task, Ok(rows)),
        Err(err) if engine::is_busy(&err) => {
            if first_attempt.elapsed() > shared.config.busy_timeout {
                tracing::warn!(task = task.id.0, query = %task.query, "busy timeout exceeded");
                let timeout = Error::Timeout {
                    query: task.query.clone(),
                    message: err.to_string(),
                };
                finish(shared, task, Err(timeout));
            } else {
                tracing::trace!(task = task.id.0, "engine busy, retrying next pass");
                task.retry_later();
            }
        }
        Err(err) => finish(shared, task, Err(query_error(task, err.to_string()))),
    }
}

fn query_error(task: &AsyncTask, message: String) -> Error {
    Error::Query {
        query: task.query.clone(),
        message,
    }
}

fn finish(shared: &Shared, task: &Arc<AsyncTask>, outcome: Result<engine::ResultGrid, Error>) {
    task.finish(outcome);
    shared.queue.publish_finished(task.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use crate::config::Config;
    use crate::host::{CallbackRef, ContextId};
    use crate::registry::{DbHandle, HandleRegistry};
    use crate::task::TaskSpec;

    fn shared(config: Config) -> Shared {
        Shared {
            queue: crate::queue::TaskQueue::new(config.max_tasks),
            config,
            registry: Arc::new(HandleRegistry::new()),
            running: AtomicBool::new(true),
        }
    }

    fn spec(handle: DbHandle, query: &str) -> TaskSpec {
        TaskSpec {
            handle,
            query: query.to_string(),
            callback: Some(CallbackRef(1)),
            save: true,
            context: ContextId(1),
            target: None,
            passthrough: None,
        }
    }

    #[test]
    fn pass_executes_pending_tasks_and_publishes_them() {
        let shared = shared(Config::default());
        let handle = shared.registry.open(":memory:").unwrap();
        shared.queue.push(spec(handle, "SELECT 'a', 1")).unwrap();
        shared.queue.push(spec(handle, "SELECT nope FROM nowhere")).unwrap();

        assert_eq!(pass(&shared), 0);

        let ok = shared.queue.pop_finished().unwrap();
        assert_eq!(ok.state(), TaskState::Done);
        let rows = ok.take_outcome().unwrap().unwrap();
        assert_eq!(rows, vec![vec!["a", "1"]]);

        let failed = shared.queue.pop_finished().unwrap();
        match failed.take_outcome().unwrap() {
            Err(Error::Query { query, message }) => {
                assert_eq!(query, "SELECT nope FROM nowhere");
                assert!(message.contains("nowhere"), "{message}");
            }
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn complete_tasks_are_reaped_on_next_pass() {
        let shared = shared(Config::default());
        let handle = shared.registry.open(":memory:").unwrap();
        shared.queue.push(spec(handle, "SELECT 1")).unwrap();

        pass(&shared);
        let task = shared.queue.pop_finished().unwrap();
        assert_eq!(shared.queue.len(), 1);

        task.mark_complete();
        assert_eq!(pass(&shared), 1);
        assert_eq!(shared.queue.len(), 0);
    }

    #[test]
    fn done_tasks_are_not_executed_twice() {
        let shared = shared(Config::default());
        let handle = shared.registry.open(":memory:").unwrap();
        shared
            .registry
            .get(handle)
            .unwrap()
            .lock()
            .execute_batch("CREATE TABLE t (v INTEGER)")
            .unwrap();
        shared.queue.push(spec(handle, "INSERT INTO t VALUES (1)")).unwrap();

        pass(&shared);
        pass(&shared);

        let count: i64 = shared
            .registry
            .get(handle)
            .unwrap()
            .lock()
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn closed_handle_surfaces_as_query_error() {
        let shared = shared(Config::default());
        let handle = shared.registry.open(":memory:").unwrap();
        shared.registry.close(handle).unwrap();
        shared.queue.push(spec(handle, "SELECT 1")).unwrap();

        pass(&shared);
        let task = shared.queue.pop_finished().unwrap();
        match task.take_outcome().unwrap() {
            Err(Error::Query { query, message }) => {
                assert_eq!(query, "SELECT 1");
                assert!(message.contains("unknown database handle"), "{message}");
            }
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn busy_task_stays_pending_then_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy.db");
        let path = path.to_str().unwrap();

        let shared = shared(Config {
            busy_timeout: Duration::from_millis(30),
            ..Config::default()
        });
        let holder = shared.registry.open(path).unwrap();
        let waiter = shared.registry.open(path).unwrap();
        shared
            .registry
            .get(holder)
            .unwrap()
            .lock()
            .execute_batch("CREATE TABLE t (v INTEGER); BEGIN EXCLUSIVE;")
            .unwrap();

        shared.queue.push(spec(waiter, "SELECT * FROM t")).unwrap();
        pass(&shared);
        assert_eq!(shared.queue.snapshot()[0].state(), TaskState::Pending);
        assert!(shared.queue.pop_finished().is_none());

        std::thread::sleep(Duration::from_millis(40));
        pass(&shared);

        let task = shared.queue.pop_finished().unwrap();
        assert!(matches!(
            task.take_outcome(),
            Some(Err(Error::Timeout { query, .. })) if query == "SELECT * FROM t"
        ));
    }
}
