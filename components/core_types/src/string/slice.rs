//! Slice views.

use memory_manager::{Trace, Tracer};

use super::{hash_units, RString, StringValue};
use crate::error::{Result, RuntimeError};

/// View of `source[begin..end)`.
///
/// The hash depends on the range, so it is computed once at construction by
/// walking the view.
#[derive(Debug)]
pub struct SliceString {
    source: RString,
    begin: usize,
    end: usize,
    hash: u32,
}

impl SliceString {
    /// Bounds were validated by [`RString::slice`].
    pub(crate) fn new(source: RString, begin: usize, end: usize) -> Self {
        let hash = hash_units(source.code_units_in(begin, end));
        SliceString {
            source,
            begin,
            end,
            hash,
        }
    }

    /// The viewed string.
    pub fn source(&self) -> &RString {
        &self.source
    }

    /// First viewed index (inclusive).
    pub fn begin(&self) -> usize {
        self.begin
    }

    /// Last viewed index (exclusive).
    pub fn end(&self) -> usize {
        self.end
    }

    /// Swap the source out for `placeholder`; only used while dropping.
    pub(crate) fn take_source(&mut self, placeholder: &RString) -> RString {
        std::mem::replace(&mut self.source, placeholder.clone())
    }
}

impl StringValue for SliceString {
    fn len(&self) -> usize {
        self.end - self.begin
    }

    fn char_at(&self, index: usize) -> Result<u16> {
        if index >= self.len() {
            return Err(RuntimeError::index_out_of_range(index, self.len()));
        }
        self.source.char_at(index + self.begin)
    }

    fn hash_code(&self) -> u32 {
        self.hash
    }
}

impl Trace for SliceString {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.source.trace(tracer);
    }
}
