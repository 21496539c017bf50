//! Virtual Machine for bytecode execution
//!
//! Main entry point for executing Rill bytecode.

use std::rc::Rc;

use bytecode_system::FunctionProto;
use core_types::{RString, Result, RuntimeConfig};
use memory_manager::GcStats;
use tracing::debug;

use crate::dispatch::Dispatcher;
use crate::logging;
use crate::output::{OutputSink, StdoutSink};
use crate::value::Value;

/// Virtual Machine for executing Rill bytecode
///
/// The VM manages the execution state including:
/// - Global variables, with the native string functions preinstalled
/// - The managed heap and its collection schedule
/// - The sink receiving `OUT` values
#[derive(Debug)]
pub struct VM {
    /// Dispatcher for bytecode execution
    dispatcher: Dispatcher,
    /// Configuration the VM was built with
    config: RuntimeConfig,
}

impl VM {
    /// Create a new VM instance with the default configuration, writing
    /// output to stdout
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a VM writing output to stdout
    ///
    /// Also installs the logging subscriber with `config.log_level` as the
    /// default filter, unless the host already installed one.
    pub fn with_config(config: RuntimeConfig) -> Self {
        logging::init_from_config(&config);
        Self::with_output(config, StdoutSink)
    }

    /// Create a VM writing output to `sink`
    pub fn with_output(config: RuntimeConfig, sink: impl OutputSink + 'static) -> Self {
        Self {
            dispatcher: Dispatcher::new(&config, Box::new(sink)),
            config,
        }
    }

    /// Execute a function prototype and return its result
    ///
    /// # Returns
    ///
    /// * `Ok(Value)` - The value returned by the root frame, or null after
    ///   `STOP`
    /// * `Err(RuntimeError)` - If an error occurs during execution
    ///
    /// # Example
    ///
    /// ```
    /// use bytecode_system::{FunctionProto, OpCode};
    /// use interpreter::{Value, VM};
    ///
    /// let mut vm = VM::new();
    /// let mut proto = FunctionProto::new("main", 0);
    /// proto.emit(OpCode::PushInt, 42).unwrap();
    /// proto.emit(OpCode::Return, 0).unwrap();
    ///
    /// let result = vm.run(proto).unwrap();
    /// assert_eq!(result, Value::Int(42));
    /// ```
    pub fn run(&mut self, proto: impl Into<Rc<FunctionProto>>) -> Result<Value> {
        self.dispatcher.execute(proto.into())
    }

    /// Decode a serialized prototype and execute it
    pub fn run_bytes(&mut self, bytes: &[u8]) -> Result<Value> {
        let proto = FunctionProto::from_bytes(bytes)?;
        self.run(proto)
    }

    /// Get a global variable by name
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.dispatcher.get_global(name)
    }

    /// Set a global variable
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.dispatcher.set_global(name.into(), value);
    }

    /// Allocate a string on the VM's heap
    pub fn string(&mut self, text: &str) -> Value {
        Value::Str(RString::from_text(self.dispatcher.heap_mut(), text))
    }

    /// Run a full collection with the globals as the only roots
    ///
    /// Returns the number of objects swept.
    pub fn collect_garbage(&mut self) -> usize {
        let freed = self.dispatcher.collect(None);
        debug!(target: "rill::gc", freed, "explicit collection");
        freed
    }

    /// Collection statistics so far
    pub fn heap_stats(&self) -> &GcStats {
        self.dispatcher.stats()
    }

    /// Number of objects registered with the heap
    pub fn live_objects(&self) -> usize {
        self.dispatcher.heap().live_objects()
    }

    /// Configuration the VM was built with
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}
