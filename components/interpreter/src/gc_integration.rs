//! GC integration for the interpreter
//!
//! Provides the heap-allocated property table and the root set the VM hands
//! to the collector.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use core_types::RString;
use memory_manager::{Gc, Trace, Tracer};

use crate::frame::Frame;
use crate::value::Value;

/// Global bindings by name
pub type Globals = HashMap<String, Value>;

/// GC-managed property table keyed by strings
///
/// Keys hash with the string hash, so a key built by concatenation finds an
/// entry stored under an equal flat string.
#[derive(Default)]
pub struct Dict {
    entries: RefCell<HashMap<RString, Value>>,
}

impl Dict {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a property value, or `None` if absent
    pub fn get(&self, key: &RString) -> Option<Value> {
        self.entries.borrow().get(key).cloned()
    }

    /// Set a property value, returning the previous one
    pub fn set(&self, key: RString, value: Value) -> Option<Value> {
        self.entries.borrow_mut().insert(key, value)
    }

    /// Check if the table has a property
    pub fn contains(&self, key: &RString) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// Remove a property, returning its value
    pub fn remove(&self, key: &RString) -> Option<Value> {
        self.entries.borrow_mut().remove(key)
    }

    /// Get the number of properties
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Get all property keys
    pub fn keys(&self) -> Vec<RString> {
        self.entries.borrow().keys().cloned().collect()
    }
}

impl fmt::Debug for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.borrow().iter()).finish()
    }
}

impl Trace for Dict {
    fn trace(&self, tracer: &mut dyn Tracer) {
        for (key, value) in self.entries.borrow().iter() {
            key.trace(tracer);
            value.trace(tracer);
        }
    }
}

/// Everything the VM treats as live without tracing: globals, the string
/// prototype and, while code runs, the innermost frame (whose trace walks
/// the caller chain)
pub struct Roots<'a> {
    /// Global bindings
    pub globals: &'a Globals,
    /// Methods shared by every string
    pub string_prototype: Option<&'a Gc<Dict>>,
    /// Innermost active frame
    pub frame: Option<&'a Frame>,
}

impl Trace for Roots<'_> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        for value in self.globals.values() {
            value.trace(tracer);
        }
        if let Some(prototype) = self.string_prototype {
            prototype.trace(tracer);
        }
        if let Some(frame) = self.frame {
            frame.trace(tracer);
        }
    }
}
