//! End-to-End Execution Tests
//!
//! Tests the complete runtime stack: JSON configuration -> VM -> hand
//! assembled program -> output. Covers recursion through globals, string
//! builtins, dictionaries and configured limits.

use std::rc::Rc;

use bytecode_system::{Constant, FunctionProto, OpCode};
use core_types::{ErrorKind, RuntimeConfig};
use interpreter::{init_logging, BufferSink, Value, VM};

fn vm_from_json(json: &str) -> (VM, BufferSink) {
    let config = RuntimeConfig::from_json_str(json).unwrap();
    let sink = BufferSink::new();
    (VM::with_output(config, sink.clone()), sink)
}

fn str_const(proto: &mut FunctionProto, text: &str) -> i32 {
    i32::from(proto.add_constant(Constant::Str(text.to_string())).unwrap())
}

/// `rev(s) { if (len(s)) return concat(rev(slice(s, 1, len(s))), s[0]); return ""; }`
fn reverse_function() -> FunctionProto {
    let mut rev = FunctionProto::new("rev", 1);
    let len = str_const(&mut rev, "len");
    let concat = str_const(&mut rev, "concat");
    let slice = str_const(&mut rev, "slice");
    let name = str_const(&mut rev, "rev");
    let empty = str_const(&mut rev, "");

    rev.emit(OpCode::LoadG, len).unwrap();
    rev.emit(OpCode::LoadV, 0).unwrap();
    rev.emit(OpCode::Call, 1).unwrap();
    let base = rev.emit_jump(OpCode::IfNo).unwrap();
    rev.emit(OpCode::LoadG, concat).unwrap();
    rev.emit(OpCode::LoadG, name).unwrap();
    rev.emit(OpCode::LoadG, slice).unwrap();
    rev.emit(OpCode::LoadV, 0).unwrap();
    rev.emit(OpCode::PushInt, 1).unwrap();
    rev.emit(OpCode::LoadG, len).unwrap();
    rev.emit(OpCode::LoadV, 0).unwrap();
    rev.emit(OpCode::Call, 1).unwrap();
    rev.emit(OpCode::Call, 3).unwrap();
    rev.emit(OpCode::Call, 1).unwrap();
    rev.emit(OpCode::LoadV, 0).unwrap();
    rev.emit(OpCode::PushInt, 0).unwrap();
    rev.emit(OpCode::GetVal, 0).unwrap();
    rev.emit(OpCode::Call, 2).unwrap();
    rev.emit(OpCode::Return, 0).unwrap();
    rev.patch_jump(base).unwrap();
    rev.emit(OpCode::LoadC, empty).unwrap();
    rev.emit(OpCode::Return, 0).unwrap();
    rev
}

/// Installs `rev` as a global, then prints `rev(word)`
fn reverse_program(word: &str) -> FunctionProto {
    let mut main = FunctionProto::new("main", 0);
    let rev = main
        .add_constant(Constant::Function(Rc::new(reverse_function())))
        .unwrap();
    let name = str_const(&mut main, "rev");
    let word = str_const(&mut main, word);
    main.emit(OpCode::Closure, rev.into()).unwrap();
    main.emit(OpCode::StoreG, name).unwrap();
    main.emit(OpCode::LoadG, name).unwrap();
    main.emit(OpCode::LoadC, word).unwrap();
    main.emit(OpCode::Call, 1).unwrap();
    main.emit(OpCode::Out, 0).unwrap();
    main.emit(OpCode::Stop, 0).unwrap();
    main
}

// ============================================================================
// Programs
// ============================================================================

#[test]
fn test_recursive_reverse() {
    let (mut vm, sink) = vm_from_json("{}");
    vm.run(reverse_program("stressed")).unwrap();
    assert_eq!(sink.lines(), vec!["desserts"]);
}

#[test]
fn test_recursive_reverse_of_empty_string() {
    let (mut vm, sink) = vm_from_json("{}");
    vm.run(reverse_program("")).unwrap();
    assert_eq!(sink.lines(), vec![""]);
}

#[test]
fn test_recursion_under_constant_collection() {
    let (mut vm, sink) = vm_from_json(r#"{ "gc_threshold": 1 }"#);
    vm.run(reverse_program("drawer")).unwrap();
    assert_eq!(sink.lines(), vec!["reward"]);
    assert!(vm.heap_stats().collections > 0);
}

#[test]
fn test_program_state_carries_across_runs() {
    let (mut vm, sink) = vm_from_json("{}");
    vm.run(reverse_program("ab")).unwrap();

    // `rev` is still bound from the first run.
    let mut again = FunctionProto::new("again", 0);
    let name = str_const(&mut again, "rev");
    let word = str_const(&mut again, "live");
    again.emit(OpCode::LoadG, name).unwrap();
    again.emit(OpCode::LoadC, word).unwrap();
    again.emit(OpCode::Call, 1).unwrap();
    again.emit(OpCode::Return, 0).unwrap();
    let result = vm.run(again).unwrap();

    assert_eq!(result.to_string(), "evil");
    assert_eq!(sink.lines(), vec!["ba"]);
}

#[test]
fn test_host_strings_passed_to_program() {
    let (mut vm, _) = vm_from_json("{}");
    let word = vm.string("host");
    vm.set_global("word", word);

    let mut main = FunctionProto::new("main", 0);
    let len = str_const(&mut main, "len");
    let word = str_const(&mut main, "word");
    main.emit(OpCode::LoadG, len).unwrap();
    main.emit(OpCode::LoadG, word).unwrap();
    main.emit(OpCode::Call, 1).unwrap();
    main.emit(OpCode::Return, 0).unwrap();
    assert_eq!(vm.run(main).unwrap(), Value::Int(4));
}

// ============================================================================
// Configured limits
// ============================================================================

#[test]
fn test_call_depth_limit_from_config() {
    let (mut vm, sink) = vm_from_json(r#"{ "max_call_depth": 5 }"#);
    let err = vm.run(reverse_program("much too long")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::StackOverflow);
    assert!(sink.lines().is_empty());

    let (mut vm, sink) = vm_from_json(r#"{ "max_call_depth": 5 }"#);
    vm.run(reverse_program("abc")).unwrap();
    assert_eq!(sink.lines(), vec!["cba"]);
}

#[test]
fn test_stack_size_from_config() {
    let (mut vm, _) = vm_from_json(r#"{ "stack_size": 2 }"#);
    let err = vm.run(reverse_program("abc")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::StackOverflow);
}

#[test]
fn test_invalid_config_rejected() {
    assert!(RuntimeConfig::from_json_str(r#"{ "max_call_depth": 0 }"#).is_err());
}

#[test]
fn test_logging_initializes_once() {
    let first = init_logging("warn");
    let second = init_logging("debug");
    assert!(!second || !first);
}
