//! Concatenation nodes.

use std::cell::OnceCell;

use memory_manager::{Trace, Tracer};

use super::{hash_units, RString, StringValue};
use crate::error::{Result, RuntimeError};

/// `left ++ right`, sharing both operands.
///
/// The length is fixed at construction. The hash is computed on first
/// request and cached; this is the only state written after construction.
#[derive(Debug)]
pub struct ConsString {
    left: RString,
    right: RString,
    len: usize,
    hash: OnceCell<u32>,
}

impl ConsString {
    pub(crate) fn new(left: RString, right: RString) -> Self {
        let len = left.len() + right.len();
        ConsString {
            left,
            right,
            len,
            hash: OnceCell::new(),
        }
    }

    /// Left operand.
    pub fn left(&self) -> &RString {
        &self.left
    }

    /// Right operand.
    pub fn right(&self) -> &RString {
        &self.right
    }

    /// Whether the hash has been computed yet.
    pub fn has_cached_hash(&self) -> bool {
        self.hash.get().is_some()
    }

    /// Swap both operands out for `placeholder`; only used while dropping.
    pub(crate) fn take_operands(&mut self, placeholder: &RString) -> [RString; 2] {
        [
            std::mem::replace(&mut self.left, placeholder.clone()),
            std::mem::replace(&mut self.right, placeholder.clone()),
        ]
    }
}

impl StringValue for ConsString {
    fn len(&self) -> usize {
        self.len
    }

    fn char_at(&self, index: usize) -> Result<u16> {
        if index >= self.len {
            return Err(RuntimeError::index_out_of_range(index, self.len));
        }
        let split = self.left.len();
        if index < split {
            self.left.char_at(index)
        } else {
            self.right.char_at(index - split)
        }
    }

    fn hash_code(&self) -> u32 {
        *self
            .hash
            .get_or_init(|| hash_units(self.left.code_units().chain(self.right.code_units())))
    }
}

impl Trace for ConsString {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.left.trace(tracer);
        self.right.trace(tracer);
    }
}
