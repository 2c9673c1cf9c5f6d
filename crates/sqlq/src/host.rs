//! The two host collaborators the queue talks to: the script VM's value
//! stack and its addressable-object table.
//!
//! Both are implemented by the embedding process. Every method here is
//! called on the host's own thread, never from the worker.

/// Identifies the host's current world/session instance. A task is only
/// delivered into the context it was submitted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u32);

/// A script function that can be invoked as a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackRef(pub u32);

/// An addressable object (entity) a callback can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u32);

/// Changes whenever the object behind an [`ObjectId`] is destroyed or its
/// slot recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LivenessToken(pub u32);

/// A reference to a script object passed through as a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(pub u32);

/// The script VM's value stack and call interface.
///
/// Argument readers return `None` when the argument is absent or has a
/// different type. Pushes build the argument list for the next call;
/// `push_array_last` pops the top value and appends it to the array below it.
pub trait ScriptHost {
    /// The current execution context, or `None` while the script system is
    /// not running.
    fn current_context(&self) -> Option<ContextId>;

    fn arg_int(&self, index: usize) -> Option<i32>;
    fn arg_float(&self, index: usize) -> Option<f32>;
    fn arg_string(&self, index: usize) -> Option<String>;
    fn arg_vector(&self, index: usize) -> Option<[f32; 3]>;
    fn arg_object(&self, index: usize) -> Option<ObjectRef>;
    fn arg_function(&self, index: usize) -> Option<CallbackRef>;

    fn push_int(&mut self, value: i32);
    fn push_float(&mut self, value: f32);
    fn push_string(&mut self, value: &str);
    fn push_vector(&mut self, value: [f32; 3]);
    fn push_object(&mut self, value: ObjectRef);
    fn push_undefined(&mut self);
    fn push_array(&mut self);
    fn push_array_last(&mut self);

    /// Run `callback` as a free function with the top `argc` stack values.
    fn exec_thread(&mut self, callback: CallbackRef, argc: usize);

    /// Run `callback` as a method on `target` with the top `argc` stack values.
    fn exec_object_thread(&mut self, target: ObjectId, callback: CallbackRef, argc: usize);

    /// Report a script-visible error.
    fn report_error(&mut self, message: &str);

    /// Push rows as an array of arrays of strings.
    fn push_grid(&mut self, rows: &[Vec<String>]) {
        self.push_array();
        for row in rows {
            self.push_array();
            for column in row {
                self.push_string(column);
                self.push_array_last();
            }
            self.push_array_last();
        }
    }
}

/// The host's addressable-object table.
pub trait ObjectStore {
    /// Current liveness token of `id`, or `None` if no such object exists.
    fn liveness(&self, id: ObjectId) -> Option<LivenessToken>;

    /// Whether `id` is still the same object that produced `captured`.
    fn is_live(&self, id: ObjectId, captured: LivenessToken) -> bool {
        self.liveness(id) == Some(captured)
    }
}
