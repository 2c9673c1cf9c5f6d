//! Passthrough value carried from submission to callback.

use crate::config::truncate_to;
use crate::host::{ObjectRef, ScriptHost};

/// One optional argument a script attaches to a query and gets back as the
/// callback's first parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    String(String),
    Vector([f32; 3]),
    Object(ObjectRef),
}

impl Value {
    /// Probe argument `index` in the fixed order int, float, string, vector,
    /// object. The first kind the host can read wins.
    pub fn probe<H: ScriptHost + ?Sized>(host: &H, index: usize, max_string_len: usize) -> Option<Self> {
        if let Some(v) = host.arg_int(index) {
            return Some(Value::Int(v));
        }
        if let Some(v) = host.arg_float(index) {
            return Some(Value::Float(v));
        }
        if let Some(v) = host.arg_string(index) {
            return Some(Value::String(truncate_to(v, max_string_len)));
        }
        if let Some(v) = host.arg_vector(index) {
            return Some(Value::Vector(v));
        }
        host.arg_object(index).map(Value::Object)
    }

    /// Push onto the host stack, tagged by kind.
    pub fn push_to<H: ScriptHost + ?Sized>(&self, host: &mut H) {
        match self {
            Value::Int(v) => host.push_int(*v),
            Value::Float(v) => host.push_float(*v),
            Value::String(v) => host.push_string(v),
            Value::Vector(v) => host.push_vector(*v),
            Value::Object(v) => host.push_object(*v),
        }
    }
}
