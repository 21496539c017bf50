//! Function prototypes - compiled bytecode containers
//!
//! A prototype carries the instruction words, the constant pool, the declared
//! variable and upvalue counts, and the capture descriptors used when a
//! closure is built from it.

use std::fmt::{self, Write as _};
use std::rc::Rc;

use core_types::{ErrorKind, Result, RuntimeError};

use crate::instruction::{Instruction, OPERAND_MAX};
use crate::opcode::OpCode;

/// Magic bytes at the start of a serialized prototype.
pub const MAGIC: &[u8; 4] = b"RILB";
/// Serialized format version.
pub const FORMAT_VERSION: u8 = 1;
/// Most variable slots, upvalue slots or constants one prototype can have;
/// operands are signed bytes, so index 127 is the last addressable one.
pub const MAX_SLOTS: usize = 128;
/// Deepest nesting of function constants `from_bytes` accepts
pub const MAX_NESTING: usize = 64;

const TAG_NULL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_BOOL: u8 = 2;
const TAG_STR: u8 = 3;
const TAG_FUNCTION: u8 = 4;

const CAPTURE_LOCAL: u8 = 0;
const CAPTURE_UPVALUE: u8 = 1;

/// Constant pool entry
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Null literal
    Null,
    /// Integer literal
    Int(i32),
    /// Boolean literal
    Bool(bool),
    /// String literal or property name
    Str(String),
    /// Nested function, consumed by `CLOSURE`
    Function(Rc<FunctionProto>),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => f.write_str("null"),
            Constant::Int(n) => write!(f, "{}", n),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Str(s) => write!(f, "{:?}", s),
            Constant::Function(proto) => write!(f, "<fn {}>", proto.name),
        }
    }
}

/// Where a closure finds one captured variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capture {
    /// Variable slot of the frame executing `CLOSURE`
    Local(u8),
    /// Upvalue slot of the closure executing `CLOSURE`
    UpValue(u8),
}

/// A compiled function
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionProto {
    /// Name used in disassembly and diagnostics
    pub name: String,
    /// Instruction words
    pub code: Vec<Instruction>,
    /// Constant pool
    pub constants: Vec<Constant>,
    /// Number of variable slots in each frame running this function
    pub variable_count: usize,
    /// Number of upvalue slots in each frame running this function
    pub upvalue_count: usize,
    /// Capture descriptors, one per upvalue slot
    pub captures: Vec<Capture>,
}

impl FunctionProto {
    /// Create an empty prototype with `variable_count` variable slots
    pub fn new(name: impl Into<String>, variable_count: usize) -> Self {
        Self {
            name: name.into(),
            variable_count,
            ..Self::default()
        }
    }

    /// Emit an instruction and return its index
    ///
    /// # Examples
    ///
    /// ```
    /// use bytecode_system::{FunctionProto, OpCode};
    ///
    /// let mut proto = FunctionProto::new("main", 0);
    /// assert_eq!(proto.emit(OpCode::PushInt, 7).unwrap(), 0);
    /// assert!(proto.emit(OpCode::PushInt, 300).is_err());
    /// ```
    pub fn emit(&mut self, op: OpCode, operand: i32) -> Result<usize> {
        let index = self.code.len();
        self.code.push(Instruction::encode(op, operand)?);
        Ok(index)
    }

    /// Emit a jump with a placeholder distance, to be fixed by
    /// [`FunctionProto::patch_jump`]
    pub fn emit_jump(&mut self, op: OpCode) -> Result<usize> {
        self.emit(op, 0)
    }

    /// Point the jump at `at` to the next instruction to be emitted
    pub fn patch_jump(&mut self, at: usize) -> Result<()> {
        let target = self.code.len() as i64;
        self.patch_jump_to(at, target)
    }

    /// Point the jump at `at` to instruction index `target`
    pub fn patch_jump_to(&mut self, at: usize, target: i64) -> Result<()> {
        let op = self
            .code
            .get(at)
            .ok_or_else(|| RuntimeError::index_out_of_range(at, self.code.len()))?
            .opcode()?;
        let distance = target - (at as i64 + 1);
        let distance = i32::try_from(distance).map_err(|_| {
            RuntimeError::new(ErrorKind::OperandOutOfRange, "jump distance overflow")
        })?;
        self.code[at] = Instruction::encode(op, distance)?;
        Ok(())
    }

    /// Add a constant and return its operand index
    ///
    /// Fails once the pool no longer fits in a signed operand.
    pub fn add_constant(&mut self, constant: Constant) -> Result<i8> {
        let index = self.constants.len();
        if index > OPERAND_MAX as usize {
            return Err(RuntimeError::new(
                ErrorKind::OperandOutOfRange,
                format!("constant pool of {} is full", self.name),
            ));
        }
        self.constants.push(constant);
        Ok(index as i8)
    }

    /// Record a capture descriptor; the upvalue count grows to cover it
    pub fn add_capture(&mut self, capture: Capture) -> usize {
        self.captures.push(capture);
        self.upvalue_count = self.upvalue_count.max(self.captures.len());
        self.captures.len() - 1
    }

    /// Get the number of instructions
    pub fn instruction_count(&self) -> usize {
        self.code.len()
    }

    /// Constant for an instruction operand
    pub fn constant(&self, operand: i8) -> Result<&Constant> {
        usize::try_from(operand)
            .ok()
            .and_then(|i| self.constants.get(i))
            .ok_or_else(|| {
                RuntimeError::new(
                    ErrorKind::ConstantOutOfRange,
                    format!(
                        "constant {} out of range for pool of {} in {}",
                        operand,
                        self.constants.len(),
                        self.name
                    ),
                )
            })
    }

    /// Render the code one instruction per line, nested functions after
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        self.disassemble_into(&mut out);
        out
    }

    fn disassemble_into(&self, out: &mut String) {
        // Writing into a String cannot fail.
        let _ = writeln!(out, "== {} ==", self.name);
        for (index, inst) in self.code.iter().enumerate() {
            let _ = write!(out, "{:04}\t{}", index, inst);
            if let Ok(op) = inst.opcode() {
                if op.uses_constant() {
                    if let Ok(constant) = self.constant(inst.operand()) {
                        let _ = write!(out, "\t; {}", constant);
                    }
                } else if op.is_jump() {
                    let target = index as i64 + 1 + i64::from(inst.operand());
                    let _ = write!(out, "\t; -> {:04}", target);
                }
            }
            out.push('\n');
        }
        for constant in &self.constants {
            if let Constant::Function(nested) = constant {
                nested.disassemble_into(out);
            }
        }
    }

    /// Serialize to the binary format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.push(FORMAT_VERSION);
        self.write_body(&mut bytes);
        bytes
    }

    fn write_body(&self, bytes: &mut Vec<u8>) {
        write_str(bytes, &self.name);
        write_u32(bytes, self.variable_count as u32);
        write_u32(bytes, self.upvalue_count as u32);

        write_u32(bytes, self.captures.len() as u32);
        for capture in &self.captures {
            match capture {
                Capture::Local(slot) => bytes.extend_from_slice(&[CAPTURE_LOCAL, *slot]),
                Capture::UpValue(index) => bytes.extend_from_slice(&[CAPTURE_UPVALUE, *index]),
            }
        }

        write_u32(bytes, self.constants.len() as u32);
        for constant in &self.constants {
            match constant {
                Constant::Null => bytes.push(TAG_NULL),
                Constant::Int(n) => {
                    bytes.push(TAG_INT);
                    bytes.extend_from_slice(&n.to_le_bytes());
                }
                Constant::Bool(b) => bytes.extend_from_slice(&[TAG_BOOL, u8::from(*b)]),
                Constant::Str(s) => {
                    bytes.push(TAG_STR);
                    write_str(bytes, s);
                }
                Constant::Function(nested) => {
                    bytes.push(TAG_FUNCTION);
                    nested.write_body(bytes);
                }
            }
        }

        write_u32(bytes, self.code.len() as u32);
        for inst in &self.code {
            bytes.extend_from_slice(&inst.raw().to_le_bytes());
        }
    }

    /// Deserialize from the binary format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader {
            bytes,
            offset: 0,
            depth: 0,
        };
        if reader.take(MAGIC.len())? != MAGIC {
            return Err(malformed("invalid magic number"));
        }
        let version = reader.u8()?;
        if version != FORMAT_VERSION {
            return Err(malformed(format!("unsupported version: {}", version)));
        }
        let proto = reader.proto()?;
        if reader.offset != bytes.len() {
            return Err(malformed(format!(
                "{} trailing bytes",
                bytes.len() - reader.offset
            )));
        }
        Ok(proto)
    }
}

fn write_u32(bytes: &mut Vec<u8>, value: u32) {
    bytes.extend_from_slice(&value.to_le_bytes());
}

fn write_str(bytes: &mut Vec<u8>, s: &str) {
    write_u32(bytes, s.len() as u32);
    bytes.extend_from_slice(s.as_bytes());
}

fn malformed(message: impl Into<String>) -> RuntimeError {
    RuntimeError::new(ErrorKind::MalformedBytecode, message)
}

/// Cursor over serialized bytes
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| malformed(format!("truncated at byte {}", self.offset)))?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn count(&mut self) -> Result<usize> {
        Ok(self.u32()? as usize)
    }

    /// A count that must not exceed [`MAX_SLOTS`]
    fn slot_count(&mut self, what: &str) -> Result<usize> {
        let count = self.count()?;
        if count > MAX_SLOTS {
            return Err(malformed(format!(
                "{} count {} exceeds {}",
                what, count, MAX_SLOTS
            )));
        }
        Ok(count)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.count()?;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|e| malformed(format!("invalid UTF-8: {}", e)))
    }

    fn proto(&mut self) -> Result<FunctionProto> {
        if self.depth >= MAX_NESTING {
            return Err(malformed(format!(
                "functions nested deeper than {}",
                MAX_NESTING
            )));
        }
        self.depth += 1;
        let proto = self.proto_body();
        self.depth -= 1;
        proto
    }

    fn proto_body(&mut self) -> Result<FunctionProto> {
        let name = self.string()?;
        let variable_count = self.slot_count("variable")?;
        let upvalue_count = self.slot_count("upvalue")?;

        let capture_count = self.count()?;
        if capture_count > upvalue_count {
            return Err(malformed(format!(
                "{} captures for {} upvalue slots",
                capture_count, upvalue_count
            )));
        }
        let mut captures = Vec::new();
        for _ in 0..capture_count {
            let tag = self.u8()?;
            let index = self.u8()?;
            captures.push(match tag {
                CAPTURE_LOCAL => Capture::Local(index),
                CAPTURE_UPVALUE => Capture::UpValue(index),
                _ => return Err(malformed(format!("unknown capture tag: {}", tag))),
            });
        }

        let constant_count = self.slot_count("constant")?;
        let mut constants = Vec::new();
        for _ in 0..constant_count {
            let tag = self.u8()?;
            constants.push(match tag {
                TAG_NULL => Constant::Null,
                TAG_INT => Constant::Int(self.u32()? as i32),
                TAG_BOOL => Constant::Bool(self.u8()? != 0),
                TAG_STR => Constant::Str(self.string()?),
                TAG_FUNCTION => Constant::Function(Rc::new(self.proto()?)),
                _ => return Err(malformed(format!("unknown constant tag: {}", tag))),
            });
        }

        let code_count = self.count()?;
        let mut code = Vec::new();
        for _ in 0..code_count {
            let inst = Instruction::from_raw(self.u16()?);
            inst.opcode()?;
            code.push(inst);
        }

        Ok(FunctionProto {
            name,
            code,
            constants,
            variable_count,
            upvalue_count,
            captures,
        })
    }
}
