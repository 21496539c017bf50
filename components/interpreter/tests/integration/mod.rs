//! Integration tests for the interpreter
//!
//! Each test assembles a small program by hand and runs it end to end,
//! observing results through the returned value and the output buffer.

use std::rc::Rc;

use bytecode_system::{Capture, Constant, FunctionProto, OpCode};
use core_types::{ErrorKind, RuntimeConfig};
use interpreter::{BufferSink, Value, VM};

fn vm_with(config: RuntimeConfig) -> (VM, BufferSink) {
    let sink = BufferSink::new();
    (VM::with_output(config, sink.clone()), sink)
}

fn vm() -> (VM, BufferSink) {
    vm_with(RuntimeConfig::default())
}

fn str_const(proto: &mut FunctionProto, text: &str) -> i32 {
    i32::from(proto.add_constant(Constant::Str(text.to_string())).unwrap())
}

fn fn_const(proto: &mut FunctionProto, inner: FunctionProto) -> i32 {
    i32::from(proto.add_constant(Constant::Function(Rc::new(inner))).unwrap())
}

/// `make_counter() { var count = ""; return fn() { count = count + "x"; return count; } }`
fn make_counter() -> FunctionProto {
    let mut inc = FunctionProto::new("inc", 0);
    inc.add_capture(Capture::Local(0));
    let concat = str_const(&mut inc, "concat");
    let x = str_const(&mut inc, "x");
    inc.emit(OpCode::LoadG, concat).unwrap();
    inc.emit(OpCode::LoadUpval, 0).unwrap();
    inc.emit(OpCode::LoadC, x).unwrap();
    inc.emit(OpCode::Call, 2).unwrap();
    inc.emit(OpCode::StoreUpval, 0).unwrap();
    inc.emit(OpCode::LoadUpval, 0).unwrap();
    inc.emit(OpCode::Return, 0).unwrap();

    let mut outer = FunctionProto::new("make_counter", 1);
    let empty = str_const(&mut outer, "");
    let inc = fn_const(&mut outer, inc);
    outer.emit(OpCode::LoadC, empty).unwrap();
    outer.emit(OpCode::StoreV, 0).unwrap();
    outer.emit(OpCode::Closure, inc).unwrap();
    outer.emit(OpCode::Return, 0).unwrap();
    outer
}

// ============================================================================
// Closures and upvalues
// ============================================================================

#[test]
fn test_counter_closure_keeps_state_after_return() {
    let (mut vm, sink) = vm();
    let mut main = FunctionProto::new("main", 1);
    let maker = fn_const(&mut main, make_counter());
    main.emit(OpCode::Closure, maker).unwrap();
    main.emit(OpCode::Call, 0).unwrap();
    main.emit(OpCode::StoreV, 0).unwrap();
    for _ in 0..3 {
        main.emit(OpCode::LoadV, 0).unwrap();
        main.emit(OpCode::Call, 0).unwrap();
        main.emit(OpCode::Out, 0).unwrap();
    }
    main.emit(OpCode::Stop, 0).unwrap();

    vm.run(main).unwrap();
    assert_eq!(sink.lines(), vec!["x", "xx", "xxx"]);
}

#[test]
fn test_independent_counters_do_not_share_state() {
    let (mut vm, sink) = vm();
    let mut main = FunctionProto::new("main", 2);
    let maker = fn_const(&mut main, make_counter());
    for slot in 0..2 {
        main.emit(OpCode::Closure, maker).unwrap();
        main.emit(OpCode::Call, 0).unwrap();
        main.emit(OpCode::StoreV, slot).unwrap();
    }
    for slot in [0, 0, 1] {
        main.emit(OpCode::LoadV, slot).unwrap();
        main.emit(OpCode::Call, 0).unwrap();
        main.emit(OpCode::Out, 0).unwrap();
    }

    vm.run(main).unwrap();
    assert_eq!(sink.lines(), vec!["x", "xx", "x"]);
}

#[test]
fn test_sibling_closures_share_one_upvalue() {
    let (mut vm, sink) = vm();

    let mut getter = FunctionProto::new("get", 0);
    getter.add_capture(Capture::Local(0));
    getter.emit(OpCode::LoadUpval, 0).unwrap();
    getter.emit(OpCode::Return, 0).unwrap();

    let mut setter = FunctionProto::new("set", 1);
    setter.add_capture(Capture::Local(0));
    setter.emit(OpCode::LoadV, 0).unwrap();
    setter.emit(OpCode::StoreUpval, 0).unwrap();
    setter.emit(OpCode::PushNull, 0).unwrap();
    setter.emit(OpCode::Return, 0).unwrap();

    // make_pair() { var value = "start"; return { get: ..., set: ... }; }
    let mut pair = FunctionProto::new("make_pair", 2);
    let start = str_const(&mut pair, "start");
    let dict = str_const(&mut pair, "dict");
    let get_key = str_const(&mut pair, "get");
    let set_key = str_const(&mut pair, "set");
    let getter = fn_const(&mut pair, getter);
    let setter = fn_const(&mut pair, setter);
    pair.emit(OpCode::LoadC, start).unwrap();
    pair.emit(OpCode::StoreV, 0).unwrap();
    pair.emit(OpCode::LoadG, dict).unwrap();
    pair.emit(OpCode::Call, 0).unwrap();
    pair.emit(OpCode::StoreV, 1).unwrap();
    for (key, function) in [(get_key, getter), (set_key, setter)] {
        pair.emit(OpCode::LoadV, 1).unwrap();
        pair.emit(OpCode::Dot, key).unwrap();
        pair.emit(OpCode::Closure, function).unwrap();
        pair.emit(OpCode::SetVal, 0).unwrap();
    }
    pair.emit(OpCode::LoadV, 1).unwrap();
    pair.emit(OpCode::Return, 0).unwrap();

    let mut main = FunctionProto::new("main", 1);
    let pair = fn_const(&mut main, pair);
    let get_key = str_const(&mut main, "get");
    let set_key = str_const(&mut main, "set");
    let changed = str_const(&mut main, "changed");
    main.emit(OpCode::Closure, pair).unwrap();
    main.emit(OpCode::Call, 0).unwrap();
    main.emit(OpCode::StoreV, 0).unwrap();
    main.emit(OpCode::LoadV, 0).unwrap();
    main.emit(OpCode::Dot, get_key).unwrap();
    main.emit(OpCode::GetVal, 0).unwrap();
    main.emit(OpCode::Call, 0).unwrap();
    main.emit(OpCode::Out, 0).unwrap();
    main.emit(OpCode::LoadV, 0).unwrap();
    main.emit(OpCode::Dot, set_key).unwrap();
    main.emit(OpCode::GetVal, 0).unwrap();
    main.emit(OpCode::LoadC, changed).unwrap();
    main.emit(OpCode::Call, 1).unwrap();
    main.emit(OpCode::Pop, 0).unwrap();
    main.emit(OpCode::LoadV, 0).unwrap();
    main.emit(OpCode::Dot, get_key).unwrap();
    main.emit(OpCode::GetVal, 0).unwrap();
    main.emit(OpCode::Call, 0).unwrap();
    main.emit(OpCode::Out, 0).unwrap();

    vm.run(main).unwrap();
    assert_eq!(sink.lines(), vec!["start", "changed"]);
}

#[test]
fn test_upvalue_captured_through_two_levels() {
    let (mut vm, sink) = vm();

    let mut inner = FunctionProto::new("inner", 0);
    inner.add_capture(Capture::UpValue(0));
    inner.emit(OpCode::LoadUpval, 0).unwrap();
    inner.emit(OpCode::Return, 0).unwrap();

    let mut middle = FunctionProto::new("middle", 0);
    middle.add_capture(Capture::Local(0));
    let inner = fn_const(&mut middle, inner);
    middle.emit(OpCode::Closure, inner).unwrap();
    middle.emit(OpCode::Return, 0).unwrap();

    let mut outer = FunctionProto::new("outer", 1);
    let deep = str_const(&mut outer, "deep");
    let middle = fn_const(&mut outer, middle);
    outer.emit(OpCode::LoadC, deep).unwrap();
    outer.emit(OpCode::StoreV, 0).unwrap();
    outer.emit(OpCode::Closure, middle).unwrap();
    outer.emit(OpCode::Return, 0).unwrap();

    let mut main = FunctionProto::new("main", 0);
    let outer = fn_const(&mut main, outer);
    main.emit(OpCode::Closure, outer).unwrap();
    main.emit(OpCode::Call, 0).unwrap();
    main.emit(OpCode::Call, 0).unwrap();
    main.emit(OpCode::Call, 0).unwrap();
    main.emit(OpCode::Out, 0).unwrap();

    vm.run(main).unwrap();
    assert_eq!(sink.lines(), vec!["deep"]);
}

#[test]
fn test_open_upvalue_sees_later_local_writes() {
    let (mut vm, sink) = vm();

    let mut peek = FunctionProto::new("peek", 0);
    peek.add_capture(Capture::Local(0));
    peek.emit(OpCode::LoadUpval, 0).unwrap();
    peek.emit(OpCode::Return, 0).unwrap();

    let mut main = FunctionProto::new("main", 2);
    let peek = fn_const(&mut main, peek);
    main.emit(OpCode::PushInt, 1).unwrap();
    main.emit(OpCode::StoreV, 0).unwrap();
    main.emit(OpCode::Closure, peek).unwrap();
    main.emit(OpCode::StoreV, 1).unwrap();
    main.emit(OpCode::PushInt, 2).unwrap();
    main.emit(OpCode::StoreV, 0).unwrap();
    main.emit(OpCode::LoadV, 1).unwrap();
    main.emit(OpCode::Call, 0).unwrap();
    main.emit(OpCode::Out, 0).unwrap();

    vm.run(main).unwrap();
    assert_eq!(sink.lines(), vec!["2"]);
}

#[test]
fn test_stop_closes_upvalues_of_abandoned_frames() {
    let (mut vm, _) = vm();

    let mut reader = FunctionProto::new("reader", 0);
    reader.add_capture(Capture::Local(0));
    reader.emit(OpCode::LoadUpval, 0).unwrap();
    reader.emit(OpCode::Return, 0).unwrap();

    // The callee publishes a closure and halts before returning.
    let mut publish = FunctionProto::new("publish", 1);
    let kept = str_const(&mut publish, "kept");
    let saved = str_const(&mut publish, "saved");
    let reader = fn_const(&mut publish, reader);
    publish.emit(OpCode::LoadC, kept).unwrap();
    publish.emit(OpCode::StoreV, 0).unwrap();
    publish.emit(OpCode::Closure, reader).unwrap();
    publish.emit(OpCode::StoreG, saved).unwrap();
    publish.emit(OpCode::Stop, 0).unwrap();

    let mut first = FunctionProto::new("first", 0);
    let publish = fn_const(&mut first, publish);
    first.emit(OpCode::Closure, publish).unwrap();
    first.emit(OpCode::Call, 0).unwrap();
    assert_eq!(vm.run(first).unwrap(), Value::Null);

    let mut second = FunctionProto::new("second", 0);
    let saved = str_const(&mut second, "saved");
    second.emit(OpCode::LoadG, saved).unwrap();
    second.emit(OpCode::Call, 0).unwrap();
    second.emit(OpCode::Return, 0).unwrap();
    assert_eq!(vm.run(second).unwrap().to_string(), "kept");
}

// ============================================================================
// Control flow and strings
// ============================================================================

/// `var s = "abc"; while (s) { out s; s = slice(s, 1, len(s)); }`
fn shrinking_loop(text: &str) -> FunctionProto {
    let mut main = FunctionProto::new("main", 1);
    let text = str_const(&mut main, text);
    let slice = str_const(&mut main, "slice");
    let len = str_const(&mut main, "len");
    main.emit(OpCode::LoadC, text).unwrap();
    main.emit(OpCode::StoreV, 0).unwrap();
    let top = main.instruction_count();
    main.emit(OpCode::LoadV, 0).unwrap();
    main.emit(OpCode::LoadG, len).unwrap();
    main.emit(OpCode::LoadV, 0).unwrap();
    main.emit(OpCode::Call, 1).unwrap();
    let exit = main.emit_jump(OpCode::IfNo).unwrap();
    main.emit(OpCode::Out, 0).unwrap();
    main.emit(OpCode::LoadG, slice).unwrap();
    main.emit(OpCode::LoadV, 0).unwrap();
    main.emit(OpCode::PushInt, 1).unwrap();
    main.emit(OpCode::LoadG, len).unwrap();
    main.emit(OpCode::LoadV, 0).unwrap();
    main.emit(OpCode::Call, 1).unwrap();
    main.emit(OpCode::Call, 3).unwrap();
    main.emit(OpCode::StoreV, 0).unwrap();
    let back = main.emit_jump(OpCode::Jmp).unwrap();
    main.patch_jump_to(back, top as i64).unwrap();
    main.patch_jump(exit).unwrap();
    main.emit(OpCode::Pop, 0).unwrap();
    main.emit(OpCode::Stop, 0).unwrap();
    main
}

#[test]
fn test_loop_with_backward_jump() {
    let (mut vm, sink) = vm();
    vm.run(shrinking_loop("abc")).unwrap();
    assert_eq!(sink.lines(), vec!["abc", "bc", "c"]);
}

#[test]
fn test_string_index_and_builtins() {
    let (mut vm, sink) = vm();
    let mut main = FunctionProto::new("main", 1);
    let concat = str_const(&mut main, "concat");
    let char_at = str_const(&mut main, "char_at");
    let to_str = str_const(&mut main, "str");
    let left = str_const(&mut main, "hello, ");
    let right = str_const(&mut main, "world");
    main.emit(OpCode::LoadG, concat).unwrap();
    main.emit(OpCode::LoadC, left).unwrap();
    main.emit(OpCode::LoadC, right).unwrap();
    main.emit(OpCode::Call, 2).unwrap();
    main.emit(OpCode::StoreV, 0).unwrap();
    main.emit(OpCode::LoadV, 0).unwrap();
    main.emit(OpCode::Out, 0).unwrap();
    main.emit(OpCode::LoadV, 0).unwrap();
    main.emit(OpCode::PushInt, 7).unwrap();
    main.emit(OpCode::GetVal, 0).unwrap();
    main.emit(OpCode::Out, 0).unwrap();
    main.emit(OpCode::LoadG, char_at).unwrap();
    main.emit(OpCode::LoadV, 0).unwrap();
    main.emit(OpCode::PushInt, 0).unwrap();
    main.emit(OpCode::Call, 2).unwrap();
    main.emit(OpCode::Out, 0).unwrap();
    main.emit(OpCode::LoadG, to_str).unwrap();
    main.emit(OpCode::PushBool, 1).unwrap();
    main.emit(OpCode::Call, 1).unwrap();
    main.emit(OpCode::Out, 0).unwrap();

    vm.run(main).unwrap();
    assert_eq!(sink.lines()[0], "hello, world");
    assert_eq!(sink.lines()[1], "w");
    assert_eq!(sink.lines()[3], "true");
}

#[test]
fn test_dict_key_built_at_runtime_matches_literal_key() {
    let (mut vm, sink) = vm();
    let mut main = FunctionProto::new("main", 1);
    let dict = str_const(&mut main, "dict");
    let concat = str_const(&mut main, "concat");
    let ab = str_const(&mut main, "ab");
    let a = str_const(&mut main, "a");
    let b = str_const(&mut main, "b");
    main.emit(OpCode::LoadG, dict).unwrap();
    main.emit(OpCode::Call, 0).unwrap();
    main.emit(OpCode::StoreV, 0).unwrap();
    // d[concat("a", "b")] = 5
    main.emit(OpCode::LoadV, 0).unwrap();
    main.emit(OpCode::LoadG, concat).unwrap();
    main.emit(OpCode::LoadC, a).unwrap();
    main.emit(OpCode::LoadC, b).unwrap();
    main.emit(OpCode::Call, 2).unwrap();
    main.emit(OpCode::PushInt, 5).unwrap();
    main.emit(OpCode::SetVal, 0).unwrap();
    // out d.ab
    main.emit(OpCode::LoadV, 0).unwrap();
    main.emit(OpCode::Dot, ab).unwrap();
    main.emit(OpCode::GetVal, 0).unwrap();
    main.emit(OpCode::Out, 0).unwrap();

    vm.run(main).unwrap();
    assert_eq!(sink.lines(), vec!["5"]);
}

// ============================================================================
// Garbage collection
// ============================================================================

#[test]
fn test_collection_during_run_keeps_live_values() {
    let config = RuntimeConfig {
        gc_threshold: 1,
        ..RuntimeConfig::default()
    };
    let (mut vm, sink) = vm_with(config);
    let mut main = FunctionProto::new("main", 1);
    let maker = fn_const(&mut main, make_counter());
    main.emit(OpCode::Closure, maker).unwrap();
    main.emit(OpCode::Call, 0).unwrap();
    main.emit(OpCode::StoreV, 0).unwrap();
    for _ in 0..4 {
        main.emit(OpCode::LoadV, 0).unwrap();
        main.emit(OpCode::Call, 0).unwrap();
        main.emit(OpCode::Out, 0).unwrap();
    }

    vm.run(main).unwrap();
    assert_eq!(sink.lines(), vec!["x", "xx", "xxx", "xxxx"]);
    assert!(vm.heap_stats().collections > 0);
}

#[test]
fn test_collection_during_loop() {
    let config = RuntimeConfig {
        gc_threshold: 2,
        ..RuntimeConfig::default()
    };
    let (mut vm, sink) = vm_with(config);
    vm.run(shrinking_loop("abcdef")).unwrap();
    assert_eq!(sink.lines(), vec!["abcdef", "bcdef", "cdef", "def", "ef", "f"]);
    assert!(vm.heap_stats().total_freed > 0);
}

#[test]
fn test_globals_survive_explicit_collection() {
    let (mut vm, _) = vm();
    let mut main = FunctionProto::new("main", 0);
    let maker = fn_const(&mut main, make_counter());
    let name = str_const(&mut main, "counter");
    main.emit(OpCode::Closure, maker).unwrap();
    main.emit(OpCode::Call, 0).unwrap();
    main.emit(OpCode::StoreG, name).unwrap();
    vm.run(main).unwrap();

    let baseline = VM::with_output(RuntimeConfig::default(), BufferSink::new()).live_objects();
    vm.collect_garbage();
    assert!(vm.live_objects() > baseline);

    let mut again = FunctionProto::new("again", 0);
    let name = str_const(&mut again, "counter");
    again.emit(OpCode::LoadG, name).unwrap();
    again.emit(OpCode::Call, 0).unwrap();
    again.emit(OpCode::Return, 0).unwrap();
    assert_eq!(vm.run(again).unwrap().to_string(), "x");
}

// ============================================================================
// Serialized programs and failures
// ============================================================================

#[test]
fn test_run_serialized_program() {
    let (mut vm, sink) = vm();
    let mut main = FunctionProto::new("main", 1);
    let maker = fn_const(&mut main, make_counter());
    main.emit(OpCode::Closure, maker).unwrap();
    main.emit(OpCode::Call, 0).unwrap();
    main.emit(OpCode::StoreV, 0).unwrap();
    main.emit(OpCode::LoadV, 0).unwrap();
    main.emit(OpCode::Call, 0).unwrap();
    main.emit(OpCode::Out, 0).unwrap();

    let bytes = main.to_bytes();
    vm.run_bytes(&bytes).unwrap();
    assert_eq!(sink.lines(), vec!["x"]);
}

#[test]
fn test_error_inside_callee_propagates() {
    let (mut vm, sink) = vm();

    let mut broken = FunctionProto::new("broken", 0);
    let missing = str_const(&mut broken, "missing");
    broken.emit(OpCode::LoadG, missing).unwrap();
    broken.emit(OpCode::Return, 0).unwrap();

    let mut main = FunctionProto::new("main", 0);
    let broken = fn_const(&mut main, broken);
    main.emit(OpCode::PushInt, 1).unwrap();
    main.emit(OpCode::Out, 0).unwrap();
    main.emit(OpCode::Closure, broken).unwrap();
    main.emit(OpCode::Call, 0).unwrap();
    main.emit(OpCode::Out, 0).unwrap();

    let err = vm.run(main).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ReferenceError);
    assert_eq!(sink.lines(), vec!["1"]);
}

#[test]
fn test_vm_reusable_after_error() {
    let (mut vm, _) = vm();
    let mut bad = FunctionProto::new("bad", 0);
    bad.emit(OpCode::Pop, 0).unwrap();
    assert!(vm.run(bad).is_err());

    let mut good = FunctionProto::new("good", 0);
    good.emit(OpCode::PushInt, 3).unwrap();
    good.emit(OpCode::Return, 0).unwrap();
    assert_eq!(vm.run(good).unwrap(), Value::Int(3));
}
