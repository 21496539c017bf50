//! Bytecode instruction representation
//!
//! An instruction is one 16-bit word: the opcode in bits 8-15 and a signed
//! two's-complement immediate in bits 0-7.

use std::fmt;

use core_types::{ErrorKind, Result, RuntimeError};

use crate::opcode::OpCode;

/// Smallest encodable operand.
pub const OPERAND_MIN: i32 = i8::MIN as i32;
/// Largest encodable operand.
pub const OPERAND_MAX: i32 = i8::MAX as i32;

/// A single encoded instruction word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(u16);

impl Instruction {
    /// Encode an opcode with an 8-bit operand.
    ///
    /// # Examples
    ///
    /// ```
    /// use bytecode_system::{Instruction, OpCode};
    ///
    /// let inst = Instruction::new(OpCode::PushInt, -1);
    /// assert_eq!(inst.raw(), 0x0aff);
    /// assert_eq!(inst.operand(), -1);
    /// ```
    pub fn new(op: OpCode, operand: i8) -> Self {
        Instruction((u16::from(op as u8) << 8) | u16::from(operand as u8))
    }

    /// Encode an opcode with a wider operand, rejecting values that do not
    /// fit in a signed byte.
    pub fn encode(op: OpCode, operand: i32) -> Result<Self> {
        let narrow = i8::try_from(operand).map_err(|_| {
            RuntimeError::new(
                ErrorKind::OperandOutOfRange,
                format!(
                    "operand {} for {} outside [{}, {}]",
                    operand,
                    op.name(),
                    OPERAND_MIN,
                    OPERAND_MAX
                ),
            )
        })?;
        Ok(Self::new(op, narrow))
    }

    /// Wrap a raw word without checking the opcode byte.
    pub fn from_raw(word: u16) -> Self {
        Instruction(word)
    }

    /// The raw 16-bit word.
    pub fn raw(self) -> u16 {
        self.0
    }

    /// The opcode byte, undecoded.
    pub fn opcode_byte(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Decode the opcode.
    pub fn opcode(self) -> Result<OpCode> {
        OpCode::try_from(self.opcode_byte())
    }

    /// The signed immediate.
    pub fn operand(self) -> i8 {
        (self.0 & 0xff) as u8 as i8
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode() {
            Ok(op) => write!(f, "{}\t{}", op.name(), self.operand()),
            Err(_) => write!(f, "<0x{:02x}>\t{}", self.opcode_byte(), self.operand()),
        }
    }
}
