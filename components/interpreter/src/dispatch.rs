//! Dispatch loop for bytecode execution
//!
//! Handles individual opcode execution. The innermost frame is owned by the
//! loop; calls push a new frame on top of it and returns pop back to the
//! caller. Collection runs only between instructions.

use std::fmt;
use std::rc::Rc;

use bytecode_system::{Capture, FunctionProto, OpCode};
use core_types::{ErrorKind, RString, Result, RuntimeConfig, RuntimeError};
use memory_manager::{Gc, GcStats, Heap};
use tracing::{debug, trace, warn};

use crate::builtins;
use crate::frame::Frame;
use crate::gc_integration::{Dict, Globals, Roots};
use crate::output::OutputSink;
use crate::upvalue::Closure;
use crate::value::Value;

/// Dispatch handler for executing bytecode
pub struct Dispatcher {
    /// Managed heap for strings, dicts, closures and upvalue boxes
    heap: Heap,
    /// Global variables storage
    globals: Globals,
    /// Properties every string resolves
    string_prototype: Gc<Dict>,
    /// Destination of `OUT`
    output: Box<dyn OutputSink>,
    /// Operand stack capacity of every frame
    stack_size: usize,
    /// Maximum number of simultaneously active frames
    max_call_depth: usize,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("heap", &self.heap)
            .field("globals", &self.globals.len())
            .field("stack_size", &self.stack_size)
            .field("max_call_depth", &self.max_call_depth)
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher with the native builtins installed
    pub fn new(config: &RuntimeConfig, output: Box<dyn OutputSink>) -> Self {
        let mut heap = Heap::with_threshold(config.gc_threshold);
        let mut globals = Globals::new();
        builtins::install(&mut globals);
        let string_prototype = builtins::string_prototype(&mut heap);
        Self {
            heap,
            globals,
            string_prototype,
            output,
            stack_size: config.stack_size,
            max_call_depth: config.max_call_depth,
        }
    }

    /// Run `proto` in a fresh root frame until it returns or stops
    pub fn execute(&mut self, proto: Rc<FunctionProto>) -> Result<Value> {
        let constants = Value::constants_of(&mut self.heap, &proto);
        let mut frame = Box::new(Frame::new(proto, constants, self.stack_size, None));
        debug!(target: "rill::vm", function = %frame.proto().name, "execution started");

        let result = self.run(&mut frame);
        if let Err(err) = &result {
            debug!(target: "rill::vm", error = %err, depth = frame.depth(), "execution aborted");
        }
        self.unwind(frame);
        result
    }

    fn run(&mut self, frame: &mut Box<Frame>) -> Result<Value> {
        let mut ip = 0usize;
        loop {
            if self.heap.should_collect() {
                self.collect(Some(&**frame));
            }

            // Falling off the end halts like STOP.
            let Some(inst) = frame.proto().code.get(ip).copied() else {
                return Ok(Value::Null);
            };
            let op = inst.opcode()?;
            let operand = inst.operand();
            trace!(target: "rill::vm", ip, op = op.name(), operand, "dispatch");
            ip += 1;

            match op {
                OpCode::LoadC => {
                    let value = frame.constant(operand)?;
                    frame.push(value)?;
                }
                OpCode::LoadV => {
                    let value = frame.get_variable(slot(operand, "variable")?)?;
                    frame.push(value)?;
                }
                OpCode::LoadG => {
                    let name = global_name(frame, operand)?;
                    let value = self.globals.get(&name).cloned().ok_or_else(|| {
                        RuntimeError::new(
                            ErrorKind::ReferenceError,
                            format!("{} is not defined", name),
                        )
                    })?;
                    frame.push(value)?;
                }
                OpCode::LoadUpval => {
                    let value = frame.get_upvalue(slot(operand, "upvalue")?)?.get()?;
                    frame.push(value)?;
                }
                OpCode::StoreV => {
                    let value = frame.pop()?;
                    frame.set_variable(slot(operand, "variable")?, value)?;
                }
                OpCode::StoreG => {
                    let name = global_name(frame, operand)?;
                    let value = frame.pop()?;
                    self.globals.insert(name, value);
                }
                OpCode::StoreUpval => {
                    let value = frame.pop()?;
                    frame.get_upvalue(slot(operand, "upvalue")?)?.set(value)?;
                }
                OpCode::SetVal => {
                    let value = frame.pop()?;
                    let key = frame.pop()?;
                    let target = frame.pop()?;
                    set_property(&target, key, value)?;
                }
                OpCode::GetVal => {
                    let key = frame.pop()?;
                    let target = frame.pop()?;
                    let value = self.get_property(&target, &key)?;
                    frame.push(value)?;
                }
                OpCode::PushNull => frame.push(Value::Null)?,
                OpCode::PushInt => frame.push(Value::Int(i32::from(operand)))?,
                OpCode::PushBool => frame.push(Value::Bool(operand != 0))?,
                OpCode::Pop => {
                    frame.pop()?;
                }
                OpCode::Closure => {
                    let closure = self.make_closure(frame, operand)?;
                    frame.push(Value::Closure(closure))?;
                }
                OpCode::Dot => {
                    let key = frame.constant(operand)?;
                    if !matches!(key, Value::Str(_)) {
                        return Err(RuntimeError::type_error(format!(
                            "property name must be a string, got {}",
                            key.type_name()
                        )));
                    }
                    frame.push(key)?;
                }
                OpCode::Call => {
                    let argc = usize::try_from(operand).map_err(|_| {
                        RuntimeError::new(
                            ErrorKind::OperandOutOfRange,
                            format!("negative argument count {}", operand),
                        )
                    })?;
                    let mut args = vec![Value::Null; argc];
                    for arg in args.iter_mut().rev() {
                        *arg = frame.pop()?;
                    }
                    let callee = frame.pop()?;
                    match callee {
                        Value::Native(native) => {
                            if args.len() != native.arity {
                                return Err(arity_error(native.name, native.arity, args.len()));
                            }
                            let result = (native.function)(&mut self.heap, &args)?;
                            frame.push(result)?;
                        }
                        Value::Closure(closure) => {
                            self.enter(frame, &closure, args, ip)?;
                            ip = 0;
                        }
                        other => {
                            return Err(RuntimeError::type_error(format!(
                                "{} is not callable",
                                other.type_name()
                            )));
                        }
                    }
                }
                OpCode::Return => {
                    let result = frame.pop()?;
                    frame.begin_return()?;
                    match frame.release()? {
                        Some(caller) => {
                            debug!(
                                target: "rill::vm",
                                function = %frame.proto().name,
                                "frame released"
                            );
                            *frame = caller;
                            ip = frame.saved_ip();
                            frame.push(result)?;
                        }
                        None => return Ok(result),
                    }
                }
                OpCode::IfNo => {
                    let condition = frame.pop()?;
                    if !condition.is_truthy() {
                        ip = jump_target(frame, ip, operand)?;
                    }
                }
                OpCode::Jmp => {
                    ip = jump_target(frame, ip, operand)?;
                }
                OpCode::Out => {
                    let value = frame.pop()?;
                    self.output.emit(&value);
                }
                OpCode::Stop => return Ok(Value::Null),
            }
        }
    }

    /// Push a frame for `closure` on top of `frame`
    fn enter(
        &mut self,
        frame: &mut Box<Frame>,
        closure: &Closure,
        args: Vec<Value>,
        return_ip: usize,
    ) -> Result<()> {
        let depth = frame.depth();
        if depth >= self.max_call_depth {
            return Err(RuntimeError::new(
                ErrorKind::StackOverflow,
                format!("maximum call depth of {} exceeded", self.max_call_depth),
            ));
        }
        let proto = closure.proto();
        if args.len() > proto.variable_count {
            return Err(arity_error(&proto.name, proto.variable_count, args.len()));
        }

        let mut callee = Frame::for_closure(closure, self.stack_size)?;
        for (index, arg) in args.into_iter().enumerate() {
            callee.set_variable(index, arg)?;
        }
        frame.set_saved_ip(return_ip);
        let caller = std::mem::replace(frame, Box::new(callee));
        frame.set_prev(caller);
        debug!(target: "rill::vm", function = %proto.name, depth = depth + 1, "frame pushed");
        Ok(())
    }

    fn make_closure(&mut self, frame: &mut Frame, operand: i8) -> Result<Gc<Closure>> {
        let proto = match frame.constant(operand)? {
            Value::Function(proto) => proto,
            other => {
                return Err(RuntimeError::type_error(format!(
                    "closure needs a function constant, got {}",
                    other.type_name()
                )))
            }
        };
        let mut upvalues = Vec::with_capacity(proto.captures.len());
        for capture in &proto.captures {
            let upvalue = match *capture {
                Capture::Local(slot) => frame.capture_variable(&mut self.heap, usize::from(slot))?,
                Capture::UpValue(index) => frame.get_upvalue(usize::from(index))?,
            };
            upvalues.push(upvalue);
        }
        let constants = Value::constants_of(&mut self.heap, &proto);
        Ok(self.heap.alloc(Closure::new(proto, constants, upvalues)))
    }

    fn get_property(&mut self, target: &Value, key: &Value) -> Result<Value> {
        match (target, key) {
            (Value::Dict(dict), Value::Str(name)) => Ok(dict.get(name).unwrap_or(Value::Null)),
            (Value::Str(s), Value::Int(i)) => {
                let index = usize::try_from(*i)
                    .ok()
                    .filter(|index| *index < s.len())
                    .ok_or_else(|| {
                        RuntimeError::new(
                            ErrorKind::IndexOutOfRange,
                            format!("index {} out of range for length {}", i, s.len()),
                        )
                    })?;
                Ok(Value::Str(RString::slice(&mut self.heap, s, index, index + 1)?))
            }
            (Value::Str(_), Value::Str(name)) => {
                Ok(self.string_prototype.get(name).unwrap_or(Value::Null))
            }
            _ => Err(RuntimeError::type_error(format!(
                "cannot read a {} key of {}",
                key.type_name(),
                target.type_name()
            ))),
        }
    }

    /// Close the upvalues of every frame left on the chain
    fn unwind(&mut self, frame: Box<Frame>) {
        let mut current = Some(frame);
        while let Some(mut frame) = current {
            if let Err(err) = frame.close_all_upvalues() {
                warn!(target: "rill::vm", error = %err, "failed to close upvalues while unwinding");
            }
            current = frame.take_prev();
        }
    }

    /// Mark from the globals and `frame`'s chain, then sweep
    pub fn collect(&mut self, frame: Option<&Frame>) -> usize {
        self.heap.collect(&Roots {
            globals: &self.globals,
            string_prototype: Some(&self.string_prototype),
            frame,
        })
    }

    /// Get a global variable by name
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    /// Set a global variable
    pub fn set_global(&mut self, name: String, value: Value) {
        self.globals.insert(name, value);
    }

    /// The managed heap
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The managed heap, for hosts allocating values
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Collection statistics so far
    pub fn stats(&self) -> &GcStats {
        self.heap.stats()
    }
}

fn slot(operand: i8, what: &str) -> Result<usize> {
    usize::try_from(operand).map_err(|_| {
        RuntimeError::new(
            ErrorKind::SlotOutOfRange,
            format!("negative {} slot {}", what, operand),
        )
    })
}

fn global_name(frame: &Frame, operand: i8) -> Result<String> {
    match frame.constant(operand)? {
        Value::Str(name) => Ok(name.to_string_lossy()),
        other => Err(RuntimeError::type_error(format!(
            "global name must be a string, got {}",
            other.type_name()
        ))),
    }
}

fn set_property(target: &Value, key: Value, value: Value) -> Result<()> {
    match (target, key) {
        (Value::Dict(dict), Value::Str(name)) => {
            dict.set(name, value);
            Ok(())
        }
        (target, key) => Err(RuntimeError::type_error(format!(
            "cannot store a {} key into {}",
            key.type_name(),
            target.type_name()
        ))),
    }
}

/// Target of a relative jump from the instruction before `next_ip`
fn jump_target(frame: &Frame, next_ip: usize, operand: i8) -> Result<usize> {
    let len = frame.proto().code.len();
    let target = next_ip as i64 + i64::from(operand);
    if target < 0 || target > len as i64 {
        return Err(RuntimeError::new(
            ErrorKind::InvalidJump,
            format!(
                "jump by {} from {} lands outside 0..={}",
                operand,
                next_ip - 1,
                len
            ),
        ));
    }
    Ok(target as usize)
}

fn arity_error(name: &str, expected: usize, got: usize) -> RuntimeError {
    RuntimeError::new(
        ErrorKind::ArityMismatch,
        format!("{} takes {} arguments, got {}", name, expected, got),
    )
}
