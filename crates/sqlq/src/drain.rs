//! Completion drain: runs on the host thread once per tick and turns finished
//! tasks into callback invocations.

use crate::engine::ResultGrid;
use crate::host::{CallbackRef, ObjectStore, ScriptHost};
use crate::queue::TaskQueue;
use crate::task::{AsyncTask, TaskState};

/// Deliver every finished task and mark it `Complete`. Returns the number of
/// callbacks invoked.
///
/// A task from another execution context is cancelled silently. Engine errors
/// go to the host's error channel. A bound callback whose target has been
/// destroyed or recycled is skipped.
pub(crate) fn drain<H, O>(queue: &TaskQueue, host: &mut H, objects: &O) -> usize
where
    H: ScriptHost + ?Sized,
    O: ObjectStore + ?Sized,
{
    let mut invoked = 0;

    while let Some(task) = queue.pop_finished() {
        debug_assert_eq!(task.state(), TaskState::Done);
        let outcome = task.take_outcome();

        // Read per task: a callback may itself change the host's context.
        if host.current_context() != Some(task.context) {
            tracing::debug!(task = task.id.0, "execution context changed, dropping result");
        } else {
            match outcome {
                Some(Err(err)) => host.report_error(&err.to_string()),
                Some(Ok(rows)) => {
                    if let Some(callback) = task.callback {
                        if deliver(host, objects, &task, callback, rows) {
                            invoked += 1;
                        }
                    }
                }
                None => {}
            }
        }

        task.mark_complete();
    }

    invoked
}

fn deliver<H, O>(
    host: &mut H,
    objects: &O,
    task: &AsyncTask,
    callback: CallbackRef,
    rows: ResultGrid,
) -> bool
where
    H: ScriptHost + ?Sized,
    O: ObjectStore + ?Sized,
{
    if let Some(target) = task.target {
        if !objects.is_live(target.object, target.token) {
            tracing::debug!(task = task.id.0, object = target.object.0, "callback target gone, skipping");
            return false;
        }
    }

    let mut argc = 1;
    if let Some(value) = &task.passthrough {
        value.push_to(host);
        argc += 1;
    }
    host.push_grid(&rows);

    match task.target {
        Some(target) => host.exec_object_thread(target.object, callback, argc),
        None => host.exec_thread(callback, argc),
    }
    true
}
