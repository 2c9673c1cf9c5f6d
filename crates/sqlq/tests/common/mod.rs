#![allow(dead_code)]

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sqlq::{
    AsyncSqlite, CallbackRef, Config, ContextId, DbHandle, HandleRegistry, LivenessToken, ObjectId,
    ObjectRef, ObjectStore, ScriptHost, Value,
};
use std::sync::Arc;

/// A value on the recording host's stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Int(i32),
    Float(f32),
    Str(String),
    Vector([f32; 3]),
    Object(ObjectRef),
    Undefined,
    Array(Vec<Slot>),
}

impl Slot {
    pub fn grid(rows: &[&[&str]]) -> Slot {
        Slot::Array(
            rows.iter()
                .map(|row| Slot::Array(row.iter().map(|c| Slot::Str(c.to_string())).collect()))
                .collect(),
        )
    }
}

/// A script argument as the host would see it.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(Value),
    Function(CallbackRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub target: Option<ObjectId>,
    pub callback: CallbackRef,
    pub args: Vec<Slot>,
}

/// Records every push, call and error. Argument reads are strict by kind.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub context: Option<ContextId>,
    pub args: Vec<Arg>,
    pub stack: Vec<Slot>,
    pub calls: Vec<Call>,
    pub errors: Vec<String>,
}

impl RecordingHost {
    pub fn in_context(context: u32) -> Self {
        RecordingHost {
            context: Some(ContextId(context)),
            ..Default::default()
        }
    }

    fn value(&self, index: usize) -> Option<&Value> {
        match self.args.get(index) {
            Some(Arg::Value(value)) => Some(value),
            _ => None,
        }
    }

    fn pop_args(&mut self, argc: usize) -> Vec<Slot> {
        let split = self.stack.len() - argc;
        self.stack.split_off(split)
    }
}

impl ScriptHost for RecordingHost {
    fn current_context(&self) -> Option<ContextId> {
        self.context
    }

    fn arg_int(&self, index: usize) -> Option<i32> {
        match self.value(index) {
            Some(Value::Int(v)) => Some(*v),
            _ => None,
        }
    }

    fn arg_float(&self, index: usize) -> Option<f32> {
        match self.value(index) {
            Some(Value::Float(v)) => Some(*v),
            _ => None,
        }
    }

    fn arg_string(&self, index: usize) -> Option<String> {
        match self.value(index) {
            Some(Value::String(v)) => Some(v.clone()),
            _ => None,
        }
    }

    fn arg_vector(&self, index: usize) -> Option<[f32; 3]> {
        match self.value(index) {
            Some(Value::Vector(v)) => Some(*v),
            _ => None,
        }
    }

    fn arg_object(&self, index: usize) -> Option<ObjectRef> {
        match self.value(index) {
            Some(Value::Object(v)) => Some(*v),
            _ => None,
        }
    }

    fn arg_function(&self, index: usize) -> Option<CallbackRef> {
        match self.args.get(index) {
            Some(Arg::Function(f)) => Some(*f),
            _ => None,
        }
    }

    fn push_int(&mut self, value: i32) {
        self.stack.push(Slot::Int(value));
    }

    fn push_float(&mut self, value: f32) {
        self.stack.push(Slot::Float(value));
    }

    fn push_string(&mut self, value: &str) {
        self.stack.push(Slot::Str(value.to_string()));
    }

    fn push_vector(&mut self, value: [f32; 3]) {
        self.stack.push(Slot::Vector(value));
    }

    fn push_object(&mut self, value: ObjectRef) {
        self.stack.push(Slot::Object(value));
    }

    fn push_undefined(&mut self) {
        self.stack.push(Slot::Undefined);
    }

    fn push_array(&mut self) {
        self.stack.push(Slot::Array(Vec::new()));
    }

    fn push_array_last(&mut self) {
        let value = self.stack.pop().expect("push_array_last on empty stack");
        match self.stack.last_mut() {
            Some(Slot::Array(items)) => items.push(value),
            other => panic!("push_array_last onto {other:?}"),
        }
    }

    fn exec_thread(&mut self, callback: CallbackRef, argc: usize) {
        let args = self.pop_args(argc);
        self.calls.push(Call {
            target: None,
            callback,
            args,
        });
    }

    fn exec_object_thread(&mut self, target: ObjectId, callback: CallbackRef, argc: usize) {
        let args = self.pop_args(argc);
        self.calls.push(Call {
            target: Some(target),
            callback,
            args,
        });
    }

    fn report_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}

#[derive(Debug, Default)]
pub struct Objects(pub HashMap<ObjectId, LivenessToken>);

impl Objects {
    pub fn with(mut self, id: u32, token: u32) -> Self {
        self.0.insert(ObjectId(id), LivenessToken(token));
        self
    }
}

impl ObjectStore for Objects {
    fn liveness(&self, id: ObjectId) -> Option<LivenessToken> {
        self.0.get(&id).copied()
    }
}

pub fn config() -> Config {
    Config {
        poll_interval: Duration::from_millis(5),
        ..Config::default()
    }
}

/// A running service over a fresh registry with one in-memory database.
pub fn start(config: Config) -> (AsyncSqlite, DbHandle) {
    let registry = Arc::new(HandleRegistry::new());
    let handle = registry.open(":memory:").unwrap();
    let service = AsyncSqlite::start(config, registry).unwrap();
    (service, handle)
}

const DEADLINE: Duration = Duration::from_secs(2);

/// Drain until `done` holds, panicking after two seconds.
pub fn drain_until(
    service: &AsyncSqlite,
    host: &mut RecordingHost,
    objects: &Objects,
    done: impl Fn(&RecordingHost) -> bool,
) {
    let start = Instant::now();
    while !done(host) {
        assert!(start.elapsed() < DEADLINE, "timed out; host state: {host:?}");
        service.drain_completions(host, objects);
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Drain until every task has been delivered and reaped.
pub fn settle(service: &AsyncSqlite, host: &mut RecordingHost, objects: &Objects) {
    let start = Instant::now();
    while service.outstanding() > 0 {
        assert!(start.elapsed() < DEADLINE, "timed out with {} tasks", service.outstanding());
        service.drain_completions(host, objects);
        std::thread::sleep(Duration::from_millis(2));
    }
}
