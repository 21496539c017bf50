//! Memory Manager - tracing contract and garbage-collected heap
//!
//! This component provides:
//! - The [`Trace`]/[`Tracer`] contract every managed type implements
//! - [`Gc`] handles, created only through [`Heap::alloc`]
//! - Mark-and-sweep collection driven by a caller-supplied root set
//! - [`CountingTracer`] for reachability instrumentation

pub mod heap;
pub mod trace;

// Re-export main types
pub use heap::{Gc, GcHeader, GcStats, Heap, DEFAULT_GC_THRESHOLD};
pub use trace::{CountingTracer, GcRef, NullTracer, Trace, Tracer};
