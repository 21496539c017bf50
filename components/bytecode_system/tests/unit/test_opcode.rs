//! Tests for the OpCode enum

use bytecode_system::OpCode;
use core_types::ErrorKind;

#[test]
fn test_opcode_values() {
    assert_eq!(OpCode::LoadC as u8, 0x00);
    assert_eq!(OpCode::LoadUpval as u8, 0x03);
    assert_eq!(OpCode::SetVal as u8, 0x07);
    assert_eq!(OpCode::PushInt as u8, 0x0a);
    assert_eq!(OpCode::Closure as u8, 0x0d);
    assert_eq!(OpCode::Call as u8, 0x0f);
    assert_eq!(OpCode::IfNo as u8, 0x11);
    assert_eq!(OpCode::Stop as u8, 0x14);
}

#[test]
fn test_opcode_names() {
    assert_eq!(OpCode::LoadUpval.name(), "LOAD_UPVAL");
    assert_eq!(OpCode::IfNo.name(), "IFNO");
    assert_eq!(OpCode::PushBool.name(), "PUSH_BOOL");
}

#[test]
fn test_names_are_unique() {
    let mut names: Vec<&str> = OpCode::ALL.iter().map(|op| op.name()).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), OpCode::ALL.len());
}

#[test]
fn test_decode_every_byte() {
    for byte in 0..=u8::MAX {
        match OpCode::try_from(byte) {
            Ok(op) => assert_eq!(op as u8, byte),
            Err(err) => {
                assert!(byte > 0x14);
                assert_eq!(err.kind, ErrorKind::InvalidOpcode);
            }
        }
    }
}

#[test]
fn test_constant_operand_opcodes() {
    assert!(OpCode::LoadG.uses_constant());
    assert!(OpCode::Dot.uses_constant());
    assert!(!OpCode::LoadV.uses_constant());
    assert!(OpCode::Jmp.is_jump());
    assert!(!OpCode::Call.is_jump());
}
