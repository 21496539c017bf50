//! Runtime values
//!
//! Scalars are stored inline; strings, dictionaries, closures and upvalue
//! boxes live on the managed heap and are reached through `Gc` handles.

use std::fmt;
use std::rc::Rc;

use bytecode_system::{Constant, FunctionProto};
use core_types::{RString, Result};
use memory_manager::{Gc, Heap, Trace, Tracer};

use crate::gc_integration::Dict;
use crate::upvalue::Closure;

/// Signature of a host function callable from bytecode
pub type NativeFn = fn(&mut Heap, &[Value]) -> Result<Value>;

/// A host function bound to a global name
#[derive(Clone, Copy)]
pub struct NativeFunction {
    /// Name used in diagnostics
    pub name: &'static str,
    /// Exact number of arguments
    pub arity: usize,
    /// The implementation
    pub function: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native {}/{}>", self.name, self.arity)
    }
}

/// A runtime value
#[derive(Clone, Default)]
pub enum Value {
    /// The null value
    #[default]
    Null,
    /// 32-bit integer
    Int(i32),
    /// Boolean
    Bool(bool),
    /// Rope string
    Str(RString),
    /// Property table
    Dict(Gc<Dict>),
    /// Function prototype that has not been closed over
    Function(Rc<FunctionProto>),
    /// Function with its captured environment
    Closure(Gc<Closure>),
    /// Host function
    Native(NativeFunction),
}

impl Value {
    /// Materialize a constant pool entry, allocating strings on `heap`
    pub fn from_constant(heap: &mut Heap, constant: &Constant) -> Value {
        match constant {
            Constant::Null => Value::Null,
            Constant::Int(n) => Value::Int(*n),
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Str(s) => Value::Str(RString::from_text(heap, s)),
            Constant::Function(proto) => Value::Function(Rc::clone(proto)),
        }
    }

    /// Materialize a whole constant pool
    pub fn constants_of(heap: &mut Heap, proto: &FunctionProto) -> Rc<[Value]> {
        proto
            .constants
            .iter()
            .map(|constant| Value::from_constant(heap, constant))
            .collect()
    }

    /// Null, false, zero and the empty string are falsy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Dict(_) | Value::Function(_) | Value::Closure(_) | Value::Native(_) => true,
        }
    }

    /// Name of the value's type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Dict(_) => "dict",
            Value::Function(_) => "function",
            Value::Closure(_) => "closure",
            Value::Native(_) => "native",
        }
    }

    /// The string, if this is one
    pub fn as_str(&self) -> Option<&RString> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The integer, if this is one
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => Gc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Gc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => a.name == b.name,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Str(s) => write!(f, "Str({:?})", s.to_string_lossy()),
            Value::Dict(d) => write!(f, "Dict({} entries)", d.len()),
            Value::Function(p) => write!(f, "Function({})", p.name),
            Value::Closure(c) => write!(f, "Closure({})", c.proto().name),
            Value::Native(n) => fmt::Debug::fmt(n, f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{}", s),
            Value::Dict(_) => f.write_str("<dict>"),
            Value::Function(p) => write!(f, "<fn {}>", p.name),
            Value::Closure(c) => write!(f, "<closure {}>", c.proto().name),
            Value::Native(n) => write!(f, "<native {}>", n.name),
        }
    }
}

impl Trace for Value {
    fn trace(&self, tracer: &mut dyn Tracer) {
        match self {
            Value::Str(s) => s.trace(tracer),
            Value::Dict(d) => d.trace(tracer),
            Value::Closure(c) => c.trace(tracer),
            Value::Null
            | Value::Int(_)
            | Value::Bool(_)
            | Value::Function(_)
            | Value::Native(_) => {}
        }
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<RString> for Value {
    fn from(s: RString) -> Self {
        Value::Str(s)
    }
}
