//! The working set: uncommitted mutations of the open block.
//!
//! Writes made while a block is open land here, on top of the latest
//! committed snapshot. Reads through the store see the overlay first.
//! `save_version` folds the overlay into a new immutable snapshot and clears
//! it.

use std::collections::BTreeMap;

/// A pending mutation of one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Set the key to a value.
    Set(Vec<u8>),
    /// Remove the key.
    Remove,
}

impl BatchOp {
    /// The value this op leaves behind, if any.
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            BatchOp::Set(value) => Some(value),
            BatchOp::Remove => None,
        }
    }
}

/// Ordered overlay of pending mutations.
///
/// Later writes to the same key replace earlier ones, so the overlay holds
/// at most one op per key.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    ops: BTreeMap<Vec<u8>, BatchOp>,
}

impl WorkingSet {
    /// Create a new empty working set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a write.
    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> &mut Self {
        self.ops.insert(key, BatchOp::Set(value));
        self
    }

    /// Stage a removal.
    pub fn remove(&mut self, key: Vec<u8>) -> &mut Self {
        self.ops.insert(key, BatchOp::Remove);
        self
    }

    /// The staged op for a key, if any.
    pub fn get(&self, key: &[u8]) -> Option<&BatchOp> {
        self.ops.get(key)
    }

    /// Get the number of staged keys.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Check if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Staged ops in key order.
    pub fn ops(&self) -> &BTreeMap<Vec<u8>, BatchOp> {
        &self.ops
    }

    /// Take ownership of the staged ops, leaving the set empty.
    pub fn take(&mut self) -> BTreeMap<Vec<u8>, BatchOp> {
        std::mem::take(&mut self.ops)
    }

    /// Apply staged ops to a map.
    pub fn apply_to(ops: BTreeMap<Vec<u8>, BatchOp>, data: &mut BTreeMap<Vec<u8>, Vec<u8>>) {
        for (key, op) in ops {
            match op {
                BatchOp::Set(value) => {
                    data.insert(key, value);
                }
                BatchOp::Remove => {
                    data.remove(&key);
                }
            }
        }
    }
}
