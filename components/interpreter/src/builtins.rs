//! Native string functions installed as globals
//!
//! Scripts reach rope operations through `CALL` on these bindings.

use core_types::{ErrorKind, RString, Result, RuntimeError};
use memory_manager::{Gc, Heap};

use crate::gc_integration::{Dict, Globals};
use crate::value::{NativeFunction, Value};

/// Every builtin, in installation order
pub const BUILTINS: [NativeFunction; 6] = [
    NativeFunction {
        name: "concat",
        arity: 2,
        function: concat,
    },
    NativeFunction {
        name: "slice",
        arity: 3,
        function: slice,
    },
    NativeFunction {
        name: "len",
        arity: 1,
        function: len,
    },
    NativeFunction {
        name: "char_at",
        arity: 2,
        function: char_at,
    },
    NativeFunction {
        name: "dict",
        arity: 0,
        function: dict,
    },
    NativeFunction {
        name: "str",
        arity: 1,
        function: to_str,
    },
];

/// Builtins every string also resolves as properties
pub const STRING_METHODS: [&str; 4] = ["len", "char_at", "slice", "concat"];

/// Bind every builtin under its name
pub fn install(globals: &mut Globals) {
    for native in BUILTINS {
        globals.insert(native.name.to_string(), Value::Native(native));
    }
}

/// The dictionary consulted when a property is read from a string
///
/// Methods are looked up, not bound: the string is passed as the first
/// argument, so `s.len` is called as `len(s)`.
pub fn string_prototype(heap: &mut Heap) -> Gc<Dict> {
    let prototype = heap.alloc(Dict::new());
    for native in BUILTINS {
        if STRING_METHODS.contains(&native.name) {
            let key = RString::from_text(heap, native.name);
            prototype.set(key, Value::Native(native));
        }
    }
    prototype
}

fn string_arg<'a>(args: &'a [Value], index: usize, function: &str) -> Result<&'a RString> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| argument_error(args, index, function, "string"))
}

fn index_arg(args: &[Value], index: usize, function: &str) -> Result<usize> {
    let n = args
        .get(index)
        .and_then(Value::as_int)
        .ok_or_else(|| argument_error(args, index, function, "int"))?;
    usize::try_from(n).map_err(|_| {
        RuntimeError::new(
            ErrorKind::IndexOutOfRange,
            format!("{}: negative index {}", function, n),
        )
    })
}

fn argument_error(args: &[Value], index: usize, function: &str, expected: &str) -> RuntimeError {
    let found = args.get(index).map_or("nothing", Value::type_name);
    RuntimeError::type_error(format!(
        "{}: argument {} must be {}, got {}",
        function, index, expected, found
    ))
}

fn concat(heap: &mut Heap, args: &[Value]) -> Result<Value> {
    let left = string_arg(args, 0, "concat")?;
    let right = string_arg(args, 1, "concat")?;
    Ok(Value::Str(RString::concat(heap, left, right)))
}

fn slice(heap: &mut Heap, args: &[Value]) -> Result<Value> {
    let source = string_arg(args, 0, "slice")?;
    let begin = index_arg(args, 1, "slice")?;
    let end = index_arg(args, 2, "slice")?;
    Ok(Value::Str(RString::slice(heap, source, begin, end)?))
}

fn len(_heap: &mut Heap, args: &[Value]) -> Result<Value> {
    let s = string_arg(args, 0, "len")?;
    i32::try_from(s.len())
        .map(Value::Int)
        .map_err(|_| RuntimeError::type_error("len: length does not fit in an int"))
}

fn char_at(_heap: &mut Heap, args: &[Value]) -> Result<Value> {
    let s = string_arg(args, 0, "char_at")?;
    let index = index_arg(args, 1, "char_at")?;
    Ok(Value::Int(i32::from(s.char_at(index)?)))
}

fn dict(heap: &mut Heap, _args: &[Value]) -> Result<Value> {
    Ok(Value::Dict(heap.alloc(Dict::new())))
}

fn to_str(heap: &mut Heap, args: &[Value]) -> Result<Value> {
    match args.first() {
        Some(Value::Str(s)) => Ok(Value::Str(s.clone())),
        Some(other) => Ok(Value::Str(RString::from_text(heap, &other.to_string()))),
        None => Err(argument_error(args, 0, "str", "a value")),
    }
}
