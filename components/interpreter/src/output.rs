//! Output sinks for the `OUT` instruction

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use tracing::warn;

use crate::value::Value;

/// Destination of values emitted by `OUT`
pub trait OutputSink {
    /// Emit one value
    fn emit(&mut self, value: &Value);
}

/// Writes each value on its own line to standard output
#[derive(Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&mut self, value: &Value) {
        let mut stdout = io::stdout().lock();
        if let Err(err) = writeln!(stdout, "{}", value) {
            warn!(target: "rill::vm", error = %err, "failed to write output");
        }
    }
}

/// Collects emitted values as text; clones share the buffer
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    lines: Rc<RefCell<Vec<String>>>,
}

impl BufferSink {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    /// Discard everything emitted so far
    pub fn clear(&self) {
        self.lines.borrow_mut().clear();
    }
}

impl OutputSink for BufferSink {
    fn emit(&mut self, value: &Value) {
        self.lines.borrow_mut().push(value.to_string());
    }
}
