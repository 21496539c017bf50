//! Heap management with mark-and-sweep collection.
//!
//! The heap is a registry of every object allocated through [`Heap::alloc`].
//! A collection marks everything reachable from a root set, then drops the
//! registry's references to the objects left unmarked. Handles are
//! reference counted, so an object is released once the registry and every
//! remaining handle have let go of it.

use std::cell::Cell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use tracing::debug;

use crate::trace::{GcRef, Trace, Tracer};

/// Default number of allocations between automatic collections.
pub const DEFAULT_GC_THRESHOLD: usize = 1024;

/// Per-object collector metadata.
#[derive(Debug, Default)]
pub struct GcHeader {
    marked: Cell<bool>,
}

impl GcHeader {
    /// Returns whether this object has been marked in the current pass.
    pub fn is_marked(&self) -> bool {
        self.marked.get()
    }

    fn set_marked(&self, marked: bool) {
        self.marked.set(marked);
    }
}

/// Header plus payload for one managed allocation.
struct GcBox<T> {
    header: GcHeader,
    value: T,
}

/// Object-safe view of a managed allocation used by the collector.
pub(crate) trait GcObject {
    fn header(&self) -> &GcHeader;
    fn trace_children(&self, tracer: &mut dyn Tracer);
}

impl<T: Trace> GcObject for GcBox<T> {
    fn header(&self) -> &GcHeader {
        &self.header
    }

    fn trace_children(&self, tracer: &mut dyn Tracer) {
        self.value.trace(tracer);
    }
}

/// Shared handle to a heap-allocated object.
///
/// Only [`Heap::alloc`] creates new handles; cloning shares the allocation.
pub struct Gc<T: Trace + 'static> {
    ptr: Rc<GcBox<T>>,
}

impl<T: Trace + 'static> Gc<T> {
    /// Type-erased reference for tracers.
    pub fn erase(&self) -> GcRef {
        GcRef(self.ptr.clone() as Rc<dyn GcObject>)
    }

    /// Address-based identity, comparable with [`GcRef::id`].
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.ptr) as *const () as usize
    }

    /// Whether two handles point at the same allocation.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.ptr, &b.ptr)
    }

    /// Whether this object carries the mark bit.
    pub fn is_marked(&self) -> bool {
        self.ptr.header.is_marked()
    }

    /// A handle that no heap registers. It is never swept and lives as long
    /// as its handles; used for shared immutable sentinels.
    pub fn unmanaged(value: T) -> Self {
        Gc {
            ptr: Rc::new(GcBox {
                header: GcHeader::default(),
                value,
            }),
        }
    }

    /// Take the payload out if `this` is the only remaining reference,
    /// including the heap registry's. Otherwise hands the handle back.
    pub fn try_unwrap(this: Self) -> Result<T, Self> {
        Rc::try_unwrap(this.ptr)
            .map(|boxed| boxed.value)
            .map_err(|ptr| Gc { ptr })
    }
}

impl<T: Trace + 'static> Clone for Gc<T> {
    fn clone(&self) -> Self {
        Self {
            ptr: Rc::clone(&self.ptr),
        }
    }
}

impl<T: Trace + 'static> Deref for Gc<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.ptr.value
    }
}

impl<T: Trace + fmt::Debug + 'static> fmt::Debug for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.ptr.value, f)
    }
}

impl<T: Trace + 'static> Trace for Gc<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        tracer.trace_object(self.erase());
    }
}

/// Garbage collection statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Number of completed collections
    pub collections: usize,
    /// Objects allocated over the heap's lifetime
    pub total_allocated: usize,
    /// Objects swept over the heap's lifetime
    pub total_freed: usize,
    /// Objects marked by the most recent collection
    pub last_marked: usize,
    /// Objects swept by the most recent collection
    pub last_freed: usize,
}

/// Marking tracer: sets mark bits and drains an explicit work-list.
struct MarkTracer {
    worklist: Vec<Rc<dyn GcObject>>,
    marked: Vec<Rc<dyn GcObject>>,
}

impl Tracer for MarkTracer {
    fn trace_object(&mut self, object: GcRef) {
        let object = object.0;
        if object.header().is_marked() {
            return;
        }
        object.header().set_marked(true);
        self.marked.push(Rc::clone(&object));
        self.worklist.push(object);
    }
}

impl MarkTracer {
    fn drain(&mut self) {
        while let Some(object) = self.worklist.pop() {
            object.trace_children(self);
        }
    }
}

/// The managed heap.
pub struct Heap {
    objects: Vec<Rc<dyn GcObject>>,
    threshold: usize,
    allocated_since_collect: usize,
    stats: GcStats,
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("live_objects", &self.objects.len())
            .field("threshold", &self.threshold)
            .field("allocated_since_collect", &self.allocated_since_collect)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Creates a new heap with the default collection threshold.
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_GC_THRESHOLD)
    }

    /// Creates a new heap that asks for collection every `threshold`
    /// allocations.
    pub fn with_threshold(threshold: usize) -> Self {
        Heap {
            objects: Vec::new(),
            threshold: threshold.max(1),
            allocated_since_collect: 0,
            stats: GcStats::default(),
        }
    }

    /// Allocates a new managed object and registers it with the heap.
    pub fn alloc<T: Trace + 'static>(&mut self, value: T) -> Gc<T> {
        let gc = Gc {
            ptr: Rc::new(GcBox {
                header: GcHeader::default(),
                value,
            }),
        };
        self.objects.push(gc.ptr.clone() as Rc<dyn GcObject>);
        self.allocated_since_collect += 1;
        self.stats.total_allocated += 1;
        gc
    }

    /// Returns true once enough allocations happened since the last
    /// collection.
    pub fn should_collect(&self) -> bool {
        self.allocated_since_collect >= self.threshold
    }

    /// Runs a full mark-and-sweep cycle from `roots`.
    ///
    /// Returns the number of objects swept from the registry.
    pub fn collect(&mut self, roots: &dyn Trace) -> usize {
        let mut tracer = MarkTracer {
            worklist: Vec::new(),
            marked: Vec::new(),
        };
        roots.trace(&mut tracer);
        tracer.drain();

        let before = self.objects.len();
        self.objects.retain(|object| object.header().is_marked());
        let freed = before - self.objects.len();

        for object in &tracer.marked {
            object.header().set_marked(false);
        }

        self.allocated_since_collect = 0;
        self.stats.collections += 1;
        self.stats.total_freed += freed;
        self.stats.last_marked = tracer.marked.len();
        self.stats.last_freed = freed;

        debug!(
            target: "rill::gc",
            marked = tracer.marked.len(),
            freed,
            live = self.objects.len(),
            "collection finished"
        );
        freed
    }

    /// Number of objects currently registered with the heap.
    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    /// Collection statistics so far.
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Allocation count that triggers [`Heap::should_collect`].
    pub fn threshold(&self) -> usize {
        self.threshold
    }
}
