//! Flat strings: rope leaves that own their code units.

use memory_manager::{Trace, Tracer};

use super::{hash_units, StringValue};
use crate::error::{Result, RuntimeError};

/// A leaf owning one immutable UTF-16 buffer.
///
/// The buffer is a single `Box<[u16]>`: one allocation, released once when
/// the leaf is dropped. The hash is computed at construction.
#[derive(Debug)]
pub struct FlatString {
    units: Box<[u16]>,
    hash: u32,
}

impl FlatString {
    pub(crate) fn new(units: Vec<u16>) -> Self {
        let units = units.into_boxed_slice();
        let hash = hash_units(units.iter().copied());
        FlatString { units, hash }
    }

    /// The owned code units.
    pub fn units(&self) -> &[u16] {
        &self.units
    }
}

impl StringValue for FlatString {
    fn len(&self) -> usize {
        self.units.len()
    }

    fn char_at(&self, index: usize) -> Result<u16> {
        self.units
            .get(index)
            .copied()
            .ok_or_else(|| RuntimeError::index_out_of_range(index, self.units.len()))
    }

    fn hash_code(&self) -> u32 {
        self.hash
    }
}

// Leaves hold no managed references.
impl Trace for FlatString {
    fn trace(&self, _tracer: &mut dyn Tracer) {}
}
