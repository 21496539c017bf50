//! Upvalue support for closures
//!
//! This module provides the runtime structures for captured variables in
//! closures. An upvalue box starts out open, aliasing one variable slot of a
//! live frame, and is closed when that frame returns: the slot's value is
//! copied into the box, which from then on owns it.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use bytecode_system::FunctionProto;
use core_types::{ErrorKind, Result, RuntimeError};
use memory_manager::{Gc, Trace, Tracer};

use crate::value::Value;

/// Variable storage of one frame, shared with the open upvalues aliasing it
pub type Slots = Rc<RefCell<Box<[Value]>>>;

enum State {
    /// Aliases `slots[index]` of a frame that has not returned yet
    Open {
        slots: Weak<RefCell<Box<[Value]>>>,
        index: usize,
    },
    /// Owns its value
    Closed(Value),
}

/// A captured variable
pub struct UpValue {
    state: RefCell<State>,
}

impl UpValue {
    /// Create an open upvalue aliasing `slots[index]`
    pub fn open(slots: &Slots, index: usize) -> Self {
        Self {
            state: RefCell::new(State::Open {
                slots: Rc::downgrade(slots),
                index,
            }),
        }
    }

    /// Create a closed upvalue holding `value`
    pub fn closed(value: Value) -> Self {
        Self {
            state: RefCell::new(State::Closed(value)),
        }
    }

    /// Check if this upvalue still aliases a frame slot
    pub fn is_open(&self) -> bool {
        matches!(*self.state.borrow(), State::Open { .. })
    }

    /// The aliased slot index, if still open
    pub fn slot_index(&self) -> Option<usize> {
        match *self.state.borrow() {
            State::Open { index, .. } => Some(index),
            State::Closed(_) => None,
        }
    }

    /// Read the captured value
    pub fn get(&self) -> Result<Value> {
        match &*self.state.borrow() {
            State::Open { slots, index } => {
                let slots = upgrade(slots)?;
                let slots = slots.borrow();
                slots
                    .get(*index)
                    .cloned()
                    .ok_or_else(|| RuntimeError::slot_out_of_range("variable", *index, slots.len()))
            }
            State::Closed(value) => Ok(value.clone()),
        }
    }

    /// Write the captured value
    pub fn set(&self, value: Value) -> Result<()> {
        match &mut *self.state.borrow_mut() {
            State::Open { slots, index } => {
                let slots = upgrade(slots)?;
                let mut slots = slots.borrow_mut();
                let len = slots.len();
                let slot = slots
                    .get_mut(*index)
                    .ok_or_else(|| RuntimeError::slot_out_of_range("variable", *index, len))?;
                *slot = value;
                Ok(())
            }
            State::Closed(slot) => {
                *slot = value;
                Ok(())
            }
        }
    }

    /// Copy the aliased slot into the box. Closing a closed box does nothing.
    pub fn close(&self) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        let value = self.get()?;
        *self.state.borrow_mut() = State::Closed(value);
        Ok(())
    }
}

fn upgrade(slots: &Weak<RefCell<Box<[Value]>>>) -> Result<Slots> {
    slots.upgrade().ok_or_else(|| {
        RuntimeError::new(
            ErrorKind::DanglingUpValue,
            "open upvalue outlived its frame",
        )
    })
}

impl fmt::Debug for UpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.state.borrow() {
            State::Open { index, .. } => write!(f, "UpValue(open @{})", index),
            State::Closed(value) => write!(f, "UpValue(closed {:?})", value),
        }
    }
}

// An open box's value belongs to the frame, which traces its own slots.
impl Trace for UpValue {
    fn trace(&self, tracer: &mut dyn Tracer) {
        if let State::Closed(value) = &*self.state.borrow() {
            value.trace(tracer);
        }
    }
}

/// Closure combines function code with its captured environment
///
/// A closure consists of a function prototype, its materialized constant
/// pool and the upvalue boxes that represent the captured variables.
pub struct Closure {
    proto: Rc<FunctionProto>,
    constants: Rc<[Value]>,
    upvalues: Vec<Gc<UpValue>>,
}

impl Closure {
    /// Create a new closure over `upvalues`
    pub fn new(proto: Rc<FunctionProto>, constants: Rc<[Value]>, upvalues: Vec<Gc<UpValue>>) -> Self {
        Self {
            proto,
            constants,
            upvalues,
        }
    }

    /// The function prototype
    pub fn proto(&self) -> &Rc<FunctionProto> {
        &self.proto
    }

    /// The materialized constant pool
    pub fn constants(&self) -> &Rc<[Value]> {
        &self.constants
    }

    /// Captured variables in capture order
    pub fn upvalues(&self) -> &[Gc<UpValue>] {
        &self.upvalues
    }

    /// Get the number of captured variables
    pub fn upvalue_count(&self) -> usize {
        self.upvalues.len()
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.proto.name)
            .field("upvalues", &self.upvalues.len())
            .finish()
    }
}

impl Trace for Closure {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.constants.trace(tracer);
        self.upvalues.trace(tracer);
    }
}
