//! Execution frames
//!
//! A frame is the activation record of one function call: a bounded operand
//! stack, fixed variable and upvalue slots, the instruction pointer saved
//! while a callee runs, and a link to the caller. Frames are owned by the
//! dispatch loop and act as GC roots; they are never heap objects.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use bytecode_system::FunctionProto;
use core_types::{ErrorKind, Result, RuntimeError};
use memory_manager::{Gc, Heap, Trace, Tracer};

use crate::upvalue::{Closure, Slots, UpValue};
use crate::value::Value;

/// Lifecycle of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Executing or waiting on a callee
    Active,
    /// Result popped, about to be released
    Returning,
    /// Upvalues closed and caller detached; never reused
    Released,
}

/// Activation record of one call
pub struct Frame {
    proto: Rc<FunctionProto>,
    constants: Rc<[Value]>,
    stack: Vec<Value>,
    stack_capacity: usize,
    variables: Slots,
    upvalues: Vec<Gc<UpValue>>,
    open_upvalues: Vec<Gc<UpValue>>,
    saved_ip: usize,
    state: FrameState,
    prev: Option<Box<Frame>>,
}

impl Frame {
    /// Create a frame with the prototype's declared variable and upvalue
    /// counts. Upvalue slots start empty and are filled with
    /// [`Frame::push_upvalue`].
    pub fn new(
        proto: Rc<FunctionProto>,
        constants: Rc<[Value]>,
        stack_capacity: usize,
        prev: Option<Box<Frame>>,
    ) -> Self {
        let variables = vec![Value::Null; proto.variable_count].into_boxed_slice();
        Self {
            upvalues: Vec::with_capacity(proto.upvalue_count),
            proto,
            constants,
            stack: Vec::with_capacity(stack_capacity.min(64)),
            stack_capacity,
            variables: Rc::new(RefCell::new(variables)),
            open_upvalues: Vec::new(),
            saved_ip: 0,
            state: FrameState::Active,
            prev,
        }
    }

    /// Create a frame to run `closure`, with its captured boxes installed
    pub fn for_closure(closure: &Closure, stack_capacity: usize) -> Result<Self> {
        let mut frame = Self::new(
            Rc::clone(closure.proto()),
            Rc::clone(closure.constants()),
            stack_capacity,
            None,
        );
        for upvalue in closure.upvalues() {
            frame.push_upvalue(upvalue.clone())?;
        }
        Ok(frame)
    }

    /// A fresh frame with the same prototype, constants, counts and
    /// capacity as `other`, an empty stack and no caller
    pub fn from_shape(other: &Frame) -> Self {
        Self::new(
            Rc::clone(&other.proto),
            Rc::clone(&other.constants),
            other.stack_capacity,
            None,
        )
    }

    fn check_live(&self) -> Result<()> {
        if self.state == FrameState::Released {
            return Err(RuntimeError::new(
                ErrorKind::FrameReleased,
                format!("frame of {} was already released", self.proto.name),
            ));
        }
        Ok(())
    }

    /// Push onto the operand stack
    pub fn push(&mut self, value: Value) -> Result<()> {
        self.check_live()?;
        if self.stack.len() >= self.stack_capacity {
            return Err(RuntimeError::stack_overflow(self.stack_capacity));
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pop from the operand stack
    pub fn pop(&mut self) -> Result<Value> {
        self.check_live()?;
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::stack_underflow(0, 0))
    }

    /// Peek `offset` values below the top; `top(0)` is the top
    pub fn top(&self, offset: usize) -> Result<Value> {
        self.check_live()?;
        let depth = self.stack.len();
        if offset >= depth {
            return Err(RuntimeError::stack_underflow(depth, offset));
        }
        Ok(self.stack[depth - 1 - offset].clone())
    }

    /// Number of values on the operand stack
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Read variable slot `index`
    pub fn get_variable(&self, index: usize) -> Result<Value> {
        self.check_live()?;
        let variables = self.variables.borrow();
        variables
            .get(index)
            .cloned()
            .ok_or_else(|| RuntimeError::slot_out_of_range("variable", index, variables.len()))
    }

    /// Write variable slot `index`
    pub fn set_variable(&mut self, index: usize, value: Value) -> Result<()> {
        self.check_live()?;
        let mut variables = self.variables.borrow_mut();
        let count = variables.len();
        let slot = variables
            .get_mut(index)
            .ok_or_else(|| RuntimeError::slot_out_of_range("variable", index, count))?;
        *slot = value;
        Ok(())
    }

    /// Number of variable slots
    pub fn variable_count(&self) -> usize {
        self.variables.borrow().len()
    }

    /// The box in upvalue slot `index`
    pub fn get_upvalue(&self, index: usize) -> Result<Gc<UpValue>> {
        self.check_live()?;
        self.upvalues
            .get(index)
            .cloned()
            .ok_or_else(|| RuntimeError::slot_out_of_range("upvalue", index, self.upvalues.len()))
    }

    /// Replace the box in a filled upvalue slot
    pub fn set_upvalue(&mut self, index: usize, upvalue: Gc<UpValue>) -> Result<()> {
        self.check_live()?;
        let filled = self.upvalues.len();
        let slot = self
            .upvalues
            .get_mut(index)
            .ok_or_else(|| RuntimeError::slot_out_of_range("upvalue", index, filled))?;
        *slot = upvalue;
        Ok(())
    }

    /// Fill the next upvalue slot
    pub fn push_upvalue(&mut self, upvalue: Gc<UpValue>) -> Result<()> {
        self.check_live()?;
        let declared = self.proto.upvalue_count;
        if self.upvalues.len() >= declared {
            return Err(RuntimeError::slot_out_of_range(
                "upvalue",
                self.upvalues.len(),
                declared,
            ));
        }
        self.upvalues.push(upvalue);
        Ok(())
    }

    /// Number of filled upvalue slots
    pub fn upvalue_count(&self) -> usize {
        self.upvalues.len()
    }

    /// The open box aliasing variable slot `index`
    ///
    /// Boxes are shared: capturing the same slot twice returns the same box,
    /// so sibling closures observe each other's writes.
    pub fn capture_variable(&mut self, heap: &mut Heap, index: usize) -> Result<Gc<UpValue>> {
        self.check_live()?;
        let count = self.variable_count();
        if index >= count {
            return Err(RuntimeError::slot_out_of_range("variable", index, count));
        }
        if let Some(existing) = self
            .open_upvalues
            .iter()
            .find(|upvalue| upvalue.slot_index() == Some(index))
        {
            return Ok(existing.clone());
        }
        let upvalue = heap.alloc(UpValue::open(&self.variables, index));
        self.open_upvalues.push(upvalue.clone());
        Ok(upvalue)
    }

    /// Number of boxes still aliasing this frame's variables
    pub fn open_upvalue_count(&self) -> usize {
        self.open_upvalues.len()
    }

    /// Close every open box aliasing this frame's variables
    pub fn close_all_upvalues(&mut self) -> Result<()> {
        for upvalue in self.open_upvalues.drain(..) {
            upvalue.close()?;
        }
        Ok(())
    }

    /// Active -> Returning
    pub fn begin_return(&mut self) -> Result<()> {
        self.check_live()?;
        self.state = FrameState::Returning;
        Ok(())
    }

    /// Close upvalues, mark the frame released and detach the caller
    pub fn release(&mut self) -> Result<Option<Box<Frame>>> {
        self.check_live()?;
        self.close_all_upvalues()?;
        self.state = FrameState::Released;
        Ok(self.prev.take())
    }

    /// Current lifecycle state
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Link this frame under a caller
    pub fn set_prev(&mut self, prev: Box<Frame>) {
        self.prev = Some(prev);
    }

    /// Detach and return the caller
    pub fn take_prev(&mut self) -> Option<Box<Frame>> {
        self.prev.take()
    }

    /// The caller, if any
    pub fn prev(&self) -> Option<&Frame> {
        self.prev.as_deref()
    }

    /// Number of frames in the chain ending here
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut frame = self.prev.as_deref();
        while let Some(caller) = frame {
            depth += 1;
            frame = caller.prev.as_deref();
        }
        depth
    }

    /// Instruction pointer saved while a callee runs
    pub fn saved_ip(&self) -> usize {
        self.saved_ip
    }

    /// Save the instruction pointer to resume at
    pub fn set_saved_ip(&mut self, ip: usize) {
        self.saved_ip = ip;
    }

    /// The function this frame runs
    pub fn proto(&self) -> &Rc<FunctionProto> {
        &self.proto
    }

    /// Constant for an instruction operand
    pub fn constant(&self, operand: i8) -> Result<Value> {
        usize::try_from(operand)
            .ok()
            .and_then(|index| self.constants.get(index))
            .cloned()
            .ok_or_else(|| {
                RuntimeError::new(
                    ErrorKind::ConstantOutOfRange,
                    format!(
                        "constant {} out of range for pool of {} in {}",
                        operand,
                        self.constants.len(),
                        self.proto.name
                    ),
                )
            })
    }

    fn trace_own(&self, tracer: &mut dyn Tracer) {
        self.constants.trace(tracer);
        self.stack.trace(tracer);
        self.variables.trace(tracer);
        self.upvalues.trace(tracer);
        self.open_upvalues.trace(tracer);
    }
}

// Walks the caller chain with a loop rather than recursing into `prev`.
impl Trace for Frame {
    fn trace(&self, tracer: &mut dyn Tracer) {
        let mut frame = Some(self);
        while let Some(current) = frame {
            current.trace_own(tracer);
            frame = current.prev.as_deref();
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("function", &self.proto.name)
            .field("state", &self.state)
            .field("stack", &self.stack)
            .field("variables", &self.variables.borrow())
            .field("upvalues", &self.upvalues.len())
            .field("open_upvalues", &self.open_upvalues.len())
            .field("saved_ip", &self.saved_ip)
            .field("depth", &self.depth())
            .finish()
    }
}
