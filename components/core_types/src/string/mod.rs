//! Immutable rope strings.
//!
//! A string is a tree of shared, immutable nodes:
//! - [`FlatString`] leaves own a UTF-16 buffer
//! - [`ConsString`] nodes represent `left ++ right` without copying
//! - [`SliceString`] nodes view a half-open range of another string
//!
//! Concatenation and slicing allocate one node and never copy code units.
//! Every traversal below (character access, hashing, materialization) walks
//! the tree iteratively, and so does releasing a node, so deep left- or
//! right-leaning ropes cannot exhaust the native stack.

mod cons;
mod flat;
mod slice;

pub use cons::ConsString;
pub use flat::FlatString;
pub use slice::SliceString;

use std::fmt::{self, Write as _};
use std::hash::{Hash, Hasher};

use memory_manager::{Gc, Heap, Trace, Tracer};

use crate::error::{Result, RuntimeError};

/// Seed of the string hash recurrence.
pub const HASH_SEED: u32 = 5381;

/// Hash a code-unit sequence with `h = h * 33 + c`, seeded at 5381.
///
/// # Examples
///
/// ```
/// use core_types::string::{hash_units, HASH_SEED};
///
/// assert_eq!(hash_units(std::iter::empty()), HASH_SEED);
/// assert_eq!(hash_units([0x61u16]), 5381 * 33 + 0x61);
/// ```
pub fn hash_units<I: IntoIterator<Item = u16>>(units: I) -> u32 {
    units.into_iter().fold(HASH_SEED, |hash, unit| {
        hash.wrapping_mul(33).wrapping_add(u32::from(unit))
    })
}

/// Capability set shared by every string variant.
pub trait StringValue {
    /// Total number of UTF-16 code units.
    fn len(&self) -> usize;

    /// Whether the string has no code units.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Code unit at `index`; fails when `index >= len()`.
    fn char_at(&self, index: usize) -> Result<u16>;

    /// Hash over every code unit in logical order.
    fn hash_code(&self) -> u32;
}

/// One node of a rope.
#[derive(Debug)]
pub enum StringNode {
    /// Leaf owning its code units
    Flat(FlatString),
    /// Concatenation of two strings
    Cons(ConsString),
    /// View of a range of another string
    Slice(SliceString),
}

impl StringNode {
    fn as_value(&self) -> &dyn StringValue {
        match self {
            StringNode::Flat(flat) => flat,
            StringNode::Cons(cons) => cons,
            StringNode::Slice(slice) => slice,
        }
    }
}

thread_local! {
    /// Stands in for the operands of a node being released.
    static PLACEHOLDER: RString =
        RString(Gc::unmanaged(StringNode::Flat(FlatString::new(Vec::new()))));
}

impl StringNode {
    fn detach_children(&mut self, placeholder: &RString, pending: &mut Vec<RString>) {
        match self {
            StringNode::Flat(_) => {}
            StringNode::Cons(cons) => pending.extend(cons.take_operands(placeholder)),
            StringNode::Slice(slice) => pending.push(slice.take_source(placeholder)),
        }
    }
}

/// Children whose last reference is held by the dying node are released from
/// a work-list instead of by nested drops.
impl Drop for StringNode {
    fn drop(&mut self) {
        if matches!(self, StringNode::Flat(_)) {
            return;
        }
        // Unavailable only while thread-local storage is being torn down.
        let Ok(placeholder) = PLACEHOLDER.try_with(RString::clone) else {
            return;
        };
        let mut pending = Vec::new();
        self.detach_children(&placeholder, &mut pending);
        while let Some(child) = pending.pop() {
            if let Ok(mut node) = Gc::try_unwrap(child.0) {
                node.detach_children(&placeholder, &mut pending);
            }
        }
    }
}

impl Trace for StringNode {
    fn trace(&self, tracer: &mut dyn Tracer) {
        match self {
            StringNode::Flat(flat) => flat.trace(tracer),
            StringNode::Cons(cons) => cons.trace(tracer),
            StringNode::Slice(slice) => slice.trace(tracer),
        }
    }
}

/// Shared handle to an immutable rope string.
///
/// Cloning is O(1) and shares the underlying node.
#[derive(Clone)]
pub struct RString(Gc<StringNode>);

impl RString {
    /// Build a flat string from UTF-8 text.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_types::RString;
    /// use memory_manager::Heap;
    ///
    /// let mut heap = Heap::new();
    /// let s = RString::from_text(&mut heap, "héllo");
    /// assert_eq!(s.len(), 5);
    /// assert_eq!(s.to_string(), "héllo");
    /// ```
    pub fn from_text(heap: &mut Heap, text: &str) -> Self {
        Self::from_utf16(heap, text.encode_utf16().collect())
    }

    /// Build a flat string that takes ownership of `units`.
    pub fn from_utf16(heap: &mut Heap, units: Vec<u16>) -> Self {
        RString(heap.alloc(StringNode::Flat(FlatString::new(units))))
    }

    /// Concatenate `left` and `right` in O(1).
    pub fn concat(heap: &mut Heap, left: &RString, right: &RString) -> Self {
        RString(heap.alloc(StringNode::Cons(ConsString::new(
            left.clone(),
            right.clone(),
        ))))
    }

    /// View `[begin, end)` of `source`.
    ///
    /// Fails unless `begin <= end <= source.len()`.
    pub fn slice(heap: &mut Heap, source: &RString, begin: usize, end: usize) -> Result<Self> {
        if begin > end || end > source.len() {
            return Err(RuntimeError::invalid_slice_range(begin, end, source.len()));
        }
        Ok(RString(heap.alloc(StringNode::Slice(SliceString::new(
            source.clone(),
            begin,
            end,
        )))))
    }

    /// Total number of code units.
    pub fn len(&self) -> usize {
        self.0.as_value().len()
    }

    /// Whether the string is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Code unit at `index`.
    ///
    /// Descends the tree without recursion; cost is proportional to the depth
    /// of the access path.
    pub fn char_at(&self, index: usize) -> Result<u16> {
        if index >= self.len() {
            return Err(RuntimeError::index_out_of_range(index, self.len()));
        }
        let mut node: &StringNode = &*self.0;
        let mut index = index;
        loop {
            match node {
                StringNode::Flat(flat) => return flat.char_at(index),
                StringNode::Cons(cons) => {
                    let split = cons.left().len();
                    if index < split {
                        node = &*cons.left().0;
                    } else {
                        index -= split;
                        node = &*cons.right().0;
                    }
                }
                StringNode::Slice(slice) => {
                    index += slice.begin();
                    node = &*slice.source().0;
                }
            }
        }
    }

    /// Cached or computed hash of the string.
    pub fn hash_code(&self) -> u32 {
        self.0.as_value().hash_code()
    }

    /// Iterator over the code units in logical order.
    pub fn code_units(&self) -> CodeUnits<'_> {
        CodeUnits::new(&*self.0, 0, self.len())
    }

    /// Iterator over `[begin, end)`; the caller guarantees the bounds.
    pub(crate) fn code_units_in(&self, begin: usize, end: usize) -> CodeUnits<'_> {
        CodeUnits::new(&*self.0, begin, end)
    }

    /// Copy the logical contents into a single flat buffer.
    pub fn materialize(&self) -> Vec<u16> {
        let mut units = Vec::with_capacity(self.len());
        units.extend(self.code_units());
        units
    }

    /// Convert to a Rust string, replacing unpaired surrogates.
    pub fn to_string_lossy(&self) -> String {
        char::decode_utf16(self.code_units())
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }

    /// The node behind this handle.
    pub fn node(&self) -> &StringNode {
        &self.0
    }

    /// Identity of the underlying allocation.
    pub fn id(&self) -> usize {
        self.0.id()
    }

    /// Whether two handles share a node.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Gc::ptr_eq(&a.0, &b.0)
    }
}

impl StringValue for RString {
    fn len(&self) -> usize {
        RString::len(self)
    }

    fn char_at(&self, index: usize) -> Result<u16> {
        RString::char_at(self, index)
    }

    fn hash_code(&self) -> u32 {
        RString::hash_code(self)
    }
}

impl Trace for RString {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.0.trace(tracer);
    }
}

impl PartialEq for RString {
    fn eq(&self, other: &Self) -> bool {
        if RString::ptr_eq(self, other) {
            return true;
        }
        self.len() == other.len()
            && self.hash_code() == other.hash_code()
            && self.code_units().eq(other.code_units())
    }
}

impl Eq for RString {}

impl Hash for RString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.hash_code());
    }
}

impl fmt::Display for RString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in char::decode_utf16(self.code_units()) {
            f.write_char(c.unwrap_or(char::REPLACEMENT_CHARACTER))?;
        }
        Ok(())
    }
}

impl fmt::Debug for RString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RString")
            .field(&self.to_string_lossy())
            .finish()
    }
}

/// In-order iterator over a range of a rope's code units.
///
/// Keeps an explicit stack of pending `(node, start, end)` ranges.
pub struct CodeUnits<'a> {
    pending: Vec<(&'a StringNode, usize, usize)>,
    current: std::slice::Iter<'a, u16>,
}

impl<'a> CodeUnits<'a> {
    fn new(node: &'a StringNode, start: usize, end: usize) -> Self {
        let empty: &'a [u16] = &[];
        CodeUnits {
            pending: vec![(node, start, end)],
            current: empty.iter(),
        }
    }
}

impl Iterator for CodeUnits<'_> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        loop {
            if let Some(unit) = self.current.next() {
                return Some(*unit);
            }
            let (node, start, end) = self.pending.pop()?;
            if start >= end {
                continue;
            }
            match node {
                StringNode::Flat(flat) => {
                    self.current = flat.units()[start..end].iter();
                }
                StringNode::Cons(cons) => {
                    let split = cons.left().len();
                    // Right half first so the left half is popped next.
                    if end > split {
                        self.pending
                            .push((&*cons.right().0, start.saturating_sub(split), end - split));
                    }
                    if start < split {
                        self.pending.push((&*cons.left().0, start, end.min(split)));
                    }
                }
                StringNode::Slice(slice) => {
                    let offset = slice.begin();
                    self.pending
                        .push((&*slice.source().0, start + offset, end + offset));
                }
            }
        }
    }
}
