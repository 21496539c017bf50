//! Bytecode interpreter for the Rill runtime
//!
//! This crate provides a stack-based virtual machine with:
//! - Execution frames with bounded operand stacks and fixed variable slots
//! - Closures over shared upvalue boxes, closed when their frame returns
//! - Native string functions backed by rope strings
//! - Mark-and-sweep collection between instructions
//!
//! # Example
//!
//! ```
//! use bytecode_system::{Constant, FunctionProto, OpCode};
//! use core_types::RuntimeConfig;
//! use interpreter::{BufferSink, VM};
//!
//! let sink = BufferSink::new();
//! let mut vm = VM::with_output(RuntimeConfig::default(), sink.clone());
//!
//! let mut proto = FunctionProto::new("main", 0);
//! let concat = proto.add_constant(Constant::Str("concat".to_string())).unwrap();
//! let a = proto.add_constant(Constant::Str("ab".to_string())).unwrap();
//! let b = proto.add_constant(Constant::Str("cd".to_string())).unwrap();
//! proto.emit(OpCode::LoadG, concat.into()).unwrap();
//! proto.emit(OpCode::LoadC, a.into()).unwrap();
//! proto.emit(OpCode::LoadC, b.into()).unwrap();
//! proto.emit(OpCode::Call, 2).unwrap();
//! proto.emit(OpCode::Out, 0).unwrap();
//!
//! vm.run(proto).unwrap();
//! assert_eq!(sink.lines(), vec!["abcd".to_string()]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builtins;
pub mod dispatch;
pub mod frame;
pub mod gc_integration;
pub mod logging;
pub mod output;
pub mod upvalue;
pub mod value;
pub mod vm;

// Re-export main types at crate root
pub use dispatch::Dispatcher;
pub use frame::{Frame, FrameState};
pub use gc_integration::{Dict, Globals, Roots};
pub use logging::{init_from_config, init_logging};
pub use output::{BufferSink, OutputSink, StdoutSink};
pub use upvalue::{Closure, Slots, UpValue};
pub use value::{NativeFn, NativeFunction, Value};
pub use vm::VM;
