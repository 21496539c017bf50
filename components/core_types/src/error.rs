//! Runtime error types.
//!
//! Every failure in the core is a contract violation (a bad index, a broken
//! stack discipline, malformed bytecode) and propagates straight to the
//! interpreter loop as a [`RuntimeError`]. Nothing here is retried or
//! recovered locally.

use std::fmt;

use thiserror::Error;

/// The kind of runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Character access beyond a string's length
    IndexOutOfRange,
    /// Push onto a full operand stack, or call depth exhausted
    StackOverflow,
    /// Pop or peek below the bottom of the operand stack
    StackUnderflow,
    /// Variable or upvalue index beyond the frame's declared count
    SlotOutOfRange,
    /// Slice bounds violating `begin <= end <= length`
    InvalidSliceRange,
    /// Instruction word with an unknown opcode byte
    InvalidOpcode,
    /// Immediate operand outside the signed 8-bit range
    OperandOutOfRange,
    /// Constant pool index out of range
    ConstantOutOfRange,
    /// Jump target outside the instruction stream
    InvalidJump,
    /// Operation applied to a value of the wrong type
    TypeError,
    /// Read of an undefined global binding
    ReferenceError,
    /// Call with more arguments than the callee has variable slots
    ArityMismatch,
    /// Open upvalue whose frame is already gone
    DanglingUpValue,
    /// Operation on a frame after it was released
    FrameReleased,
    /// Serialized bytecode that cannot be decoded
    MalformedBytecode,
}

impl ErrorKind {
    /// Stable, human-readable name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::IndexOutOfRange => "IndexOutOfRange",
            ErrorKind::StackOverflow => "StackOverflow",
            ErrorKind::StackUnderflow => "StackUnderflow",
            ErrorKind::SlotOutOfRange => "SlotOutOfRange",
            ErrorKind::InvalidSliceRange => "InvalidSliceRange",
            ErrorKind::InvalidOpcode => "InvalidOpcode",
            ErrorKind::OperandOutOfRange => "OperandOutOfRange",
            ErrorKind::ConstantOutOfRange => "ConstantOutOfRange",
            ErrorKind::InvalidJump => "InvalidJump",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::ArityMismatch => "ArityMismatch",
            ErrorKind::DanglingUpValue => "DanglingUpValue",
            ErrorKind::FrameReleased => "FrameReleased",
            ErrorKind::MalformedBytecode => "MalformedBytecode",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A runtime error with its kind and a human-readable message.
///
/// # Examples
///
/// ```
/// use core_types::{ErrorKind, RuntimeError};
///
/// let error = RuntimeError::index_out_of_range(7, 3);
/// assert_eq!(error.kind, ErrorKind::IndexOutOfRange);
/// assert_eq!(error.to_string(), "IndexOutOfRange: index 7 out of range for length 3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RuntimeError {
    /// The type of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
}

/// Result alias used throughout the runtime.
pub type Result<T> = std::result::Result<T, RuntimeError>;

impl RuntimeError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Character index beyond a string's length.
    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Self::new(
            ErrorKind::IndexOutOfRange,
            format!("index {} out of range for length {}", index, len),
        )
    }

    /// Push onto a full stack.
    pub fn stack_overflow(capacity: usize) -> Self {
        Self::new(
            ErrorKind::StackOverflow,
            format!("stack capacity of {} exceeded", capacity),
        )
    }

    /// Pop or peek past the bottom of the stack.
    pub fn stack_underflow(depth: usize, offset: usize) -> Self {
        Self::new(
            ErrorKind::StackUnderflow,
            format!("cannot read {} below top of a stack of depth {}", offset, depth),
        )
    }

    /// Variable or upvalue slot beyond the declared count.
    pub fn slot_out_of_range(what: &str, index: usize, count: usize) -> Self {
        Self::new(
            ErrorKind::SlotOutOfRange,
            format!("{} slot {} out of range for {} slots", what, index, count),
        )
    }

    /// Slice bounds violating `begin <= end <= len`.
    pub fn invalid_slice_range(begin: usize, end: usize, len: usize) -> Self {
        Self::new(
            ErrorKind::InvalidSliceRange,
            format!("slice [{}, {}) invalid for length {}", begin, end, len),
        )
    }

    /// Value of the wrong type for an operation.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    /// Whether this error is of the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}
