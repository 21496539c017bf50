//! Bytecode system for the Rill runtime
//!
//! This crate provides the instruction encoding, the opcode set and the
//! function prototypes the interpreter executes.
//!
//! # Features
//!
//! - 16-bit instruction words with a signed 8-bit immediate
//! - Closed opcode set for a stack-based VM
//! - Binary serialization support
//! - Disassembler
//!
//! # Example
//!
//! ```
//! use bytecode_system::{Constant, FunctionProto, OpCode};
//!
//! let mut proto = FunctionProto::new("main", 0);
//!
//! // Add constants
//! let idx = proto.add_constant(Constant::Str("hi".to_string())).unwrap();
//!
//! // Emit instructions
//! proto.emit(OpCode::LoadC, i32::from(idx)).unwrap();
//! proto.emit(OpCode::Out, 0).unwrap();
//! proto.emit(OpCode::Stop, 0).unwrap();
//!
//! // Serialize
//! let bytes = proto.to_bytes();
//! let restored = FunctionProto::from_bytes(&bytes).unwrap();
//! assert_eq!(restored, proto);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod instruction;
pub mod opcode;

// Re-export main types at crate root
pub use chunk::{Capture, Constant, FunctionProto};
pub use instruction::Instruction;
pub use opcode::OpCode;
