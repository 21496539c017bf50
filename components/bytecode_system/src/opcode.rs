//! Bytecode opcodes for the stack VM
//!
//! Every opcode occupies the high byte of an instruction word. The numeric
//! values are part of the serialized format and must not be reordered.

use core_types::{ErrorKind, RuntimeError};

/// Bytecode opcodes, one per high byte of an instruction word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Push constant[operand]
    LoadC = 0x00,
    /// Push variable[operand]
    LoadV = 0x01,
    /// Push the global named by constant[operand]
    LoadG = 0x02,
    /// Push the value of upvalue[operand]
    LoadUpval = 0x03,
    /// Pop into variable[operand]
    StoreV = 0x04,
    /// Pop into the global named by constant[operand]
    StoreG = 0x05,
    /// Pop into upvalue[operand]
    StoreUpval = 0x06,
    /// Pop value, key and dict; store dict[key] = value
    SetVal = 0x07,
    /// Pop key and target; push target[key]
    GetVal = 0x08,
    /// Push null
    PushNull = 0x09,
    /// Push the operand as an integer
    PushInt = 0x0a,
    /// Push `operand != 0`
    PushBool = 0x0b,
    /// Discard the top of the stack
    Pop = 0x0c,
    /// Build a closure from the prototype at constant[operand]
    Closure = 0x0d,
    /// Push the property name at constant[operand]
    Dot = 0x0e,
    /// Call with `operand` arguments
    Call = 0x0f,
    /// Return the top of the stack to the caller
    Return = 0x10,
    /// Pop a condition; jump by operand when it is falsy
    IfNo = 0x11,
    /// Jump by operand
    Jmp = 0x12,
    /// Pop and emit to the output sink
    Out = 0x13,
    /// Halt execution
    Stop = 0x14,
}

impl OpCode {
    /// Every opcode in numeric order.
    pub const ALL: [OpCode; 21] = [
        OpCode::LoadC,
        OpCode::LoadV,
        OpCode::LoadG,
        OpCode::LoadUpval,
        OpCode::StoreV,
        OpCode::StoreG,
        OpCode::StoreUpval,
        OpCode::SetVal,
        OpCode::GetVal,
        OpCode::PushNull,
        OpCode::PushInt,
        OpCode::PushBool,
        OpCode::Pop,
        OpCode::Closure,
        OpCode::Dot,
        OpCode::Call,
        OpCode::Return,
        OpCode::IfNo,
        OpCode::Jmp,
        OpCode::Out,
        OpCode::Stop,
    ];

    /// Assembly mnemonic.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::LoadC => "LOAD_C",
            OpCode::LoadV => "LOAD_V",
            OpCode::LoadG => "LOAD_G",
            OpCode::LoadUpval => "LOAD_UPVAL",
            OpCode::StoreV => "STORE_V",
            OpCode::StoreG => "STORE_G",
            OpCode::StoreUpval => "STORE_UPVAL",
            OpCode::SetVal => "SET_VAL",
            OpCode::GetVal => "GET_VAL",
            OpCode::PushNull => "PUSH_NULL",
            OpCode::PushInt => "PUSH_INT",
            OpCode::PushBool => "PUSH_BOOL",
            OpCode::Pop => "POP",
            OpCode::Closure => "CLOSURE",
            OpCode::Dot => "DOT",
            OpCode::Call => "CALL",
            OpCode::Return => "RETURN",
            OpCode::IfNo => "IFNO",
            OpCode::Jmp => "JMP",
            OpCode::Out => "OUT",
            OpCode::Stop => "STOP",
        }
    }

    /// Check if this opcode ends a basic block
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            OpCode::Return | OpCode::Jmp | OpCode::IfNo | OpCode::Stop
        )
    }

    /// Check if the operand is a relative jump distance
    pub fn is_jump(self) -> bool {
        matches!(self, OpCode::Jmp | OpCode::IfNo)
    }

    /// Check if the operand indexes the constant pool
    pub fn uses_constant(self) -> bool {
        matches!(
            self,
            OpCode::LoadC | OpCode::LoadG | OpCode::StoreG | OpCode::Closure | OpCode::Dot
        )
    }
}

impl TryFrom<u8> for OpCode {
    type Error = RuntimeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        OpCode::ALL.get(usize::from(byte)).copied().ok_or_else(|| {
            RuntimeError::new(
                ErrorKind::InvalidOpcode,
                format!("unknown opcode byte 0x{:02x}", byte),
            )
        })
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        op as u8
    }
}
