//! Object tracing for garbage collection.
//!
//! The `Trace` trait is the interface between managed objects and the
//! collector. Every type reachable from a [`Gc`](crate::Gc) handle implements
//! it to report the managed references it holds. The collector, not the
//! object, decides whether a reported reference still needs visiting, so
//! `trace` implementations never recurse on their own.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::heap::GcObject;

/// Trait for types that can be traced by the garbage collector.
///
/// Implementations must report every managed reference they hold by calling
/// `trace` on it (which ends in [`Tracer::trace_object`]). Reporting the same
/// reference more than once is harmless; missing one lets the collector
/// reclaim a live object.
///
/// # Example
///
/// ```
/// use memory_manager::{Gc, Trace, Tracer};
///
/// struct Pair {
///     left: Option<Gc<Leaf>>,
///     right: Option<Gc<Leaf>>,
/// }
///
/// struct Leaf;
///
/// impl Trace for Leaf {
///     fn trace(&self, _tracer: &mut dyn Tracer) {}
/// }
///
/// impl Trace for Pair {
///     fn trace(&self, tracer: &mut dyn Tracer) {
///         self.left.trace(tracer);
///         self.right.trace(tracer);
///     }
/// }
/// ```
pub trait Trace {
    /// Visit all managed references held by this object.
    fn trace(&self, tracer: &mut dyn Tracer);
}

/// Visitor handed to [`Trace::trace`] during a mark pass.
pub trait Tracer {
    /// Report a reference to a managed object.
    fn trace_object(&mut self, object: GcRef);
}

/// Type-erased reference to a managed object.
///
/// Produced by [`Gc::erase`](crate::Gc::erase) and consumed by tracers.
#[derive(Clone)]
pub struct GcRef(pub(crate) Rc<dyn GcObject>);

impl GcRef {
    /// Address-based identity of the referenced allocation.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Whether the referenced object carries the mark bit.
    pub fn is_marked(&self) -> bool {
        self.0.header().is_marked()
    }

    /// Report every managed reference held by the referenced object.
    pub fn trace_children(&self, tracer: &mut dyn Tracer) {
        self.0.trace_children(tracer);
    }
}

impl fmt::Debug for GcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GcRef({:#x})", self.id())
    }
}

impl<T: Trace + ?Sized> Trace for Box<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        (**self).trace(tracer);
    }
}

impl<T: Trace> Trace for Option<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        if let Some(value) = self {
            value.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for [T] {
    fn trace(&self, tracer: &mut dyn Tracer) {
        for value in self {
            value.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for Vec<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.as_slice().trace(tracer);
    }
}

impl<T: Trace + ?Sized> Trace for Rc<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        (**self).trace(tracer);
    }
}

// Collection only runs between instructions, so no mutable borrow is live.
impl<T: Trace + ?Sized> Trace for RefCell<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.borrow().trace(tracer);
    }
}

/// A tracer that counts every object transitively reachable from a root.
///
/// Keeps its own visited set instead of touching mark bits, so it can run
/// at any time without disturbing the heap. Useful for asserting
/// reachability in tests and for debugging.
#[derive(Debug, Default)]
pub struct CountingTracer {
    visited: HashSet<usize>,
    worklist: Vec<GcRef>,
    /// Number of references reported, duplicates included.
    pub edges: usize,
}

impl CountingTracer {
    /// Create a new counting tracer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk everything reachable from `root` and return the finished tracer.
    pub fn count(root: &dyn Trace) -> Self {
        let mut tracer = Self::new();
        root.trace(&mut tracer);
        while let Some(object) = tracer.worklist.pop() {
            object.trace_children(&mut tracer);
        }
        tracer
    }

    /// Number of distinct objects reached.
    pub fn objects(&self) -> usize {
        self.visited.len()
    }

    /// Whether the object with the given identity was reached.
    pub fn reached(&self, id: usize) -> bool {
        self.visited.contains(&id)
    }
}

impl Tracer for CountingTracer {
    fn trace_object(&mut self, object: GcRef) {
        self.edges += 1;
        if self.visited.insert(object.id()) {
            self.worklist.push(object);
        }
    }
}

/// A tracer that ignores everything (for tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTracer;

impl Tracer for NullTracer {
    #[inline]
    fn trace_object(&mut self, _object: GcRef) {}
}
