//! Immutable committed versions.
//!
//! A [`StateSnapshot`] is a sealed version of the state: its height, its root
//! fingerprint, and the full key/value contents. Contents are shared behind
//! an `Arc`, so cloning a snapshot is cheap and readers on other threads are
//! never affected by later writes.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use kestrel_core::{compute_state_root, Hash, Result};

use crate::iter::scan_prefix;
use crate::traits::StateReader;

/// A sealed, immutable version of the state.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    version: u64,
    root: Hash,
    data: Arc<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl StateSnapshot {
    /// The empty state at version 0.
    pub fn genesis() -> Self {
        Self {
            version: 0,
            root: Hash::ZERO,
            data: Arc::new(BTreeMap::new()),
        }
    }

    /// Seal `data` as `version`, computing its root.
    pub fn seal(version: u64, data: BTreeMap<Vec<u8>, Vec<u8>>) -> Self {
        let root = compute_state_root(data.iter().map(|(k, v)| (k.as_slice(), v.as_slice())));
        Self {
            version,
            root,
            data: Arc::new(data),
        }
    }

    /// The same contents re-sealed as `version`. Shares the data.
    pub(crate) fn advance(&self, version: u64) -> Self {
        Self {
            version,
            root: self.root,
            data: Arc::clone(&self.data),
        }
    }

    /// The height of this version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The root fingerprint of this version.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// Number of keys.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Position `key` has (or would have) in sorted key order.
    pub fn index_of(&self, key: &[u8]) -> u64 {
        self.data
            .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key)))
            .count() as u64
    }

    /// Borrow the full contents.
    pub fn data(&self) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        &self.data
    }
}

impl StateReader for StateSnapshot {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(scan_prefix(&self.data, prefix)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::hash_leaf;

    fn sample() -> StateSnapshot {
        StateSnapshot::seal(
            3,
            BTreeMap::from([
                (b"b".to_vec(), b"2".to_vec()),
                (b"d".to_vec(), b"4".to_vec()),
            ]),
        )
    }

    #[test]
    fn test_genesis_is_empty() {
        let genesis = StateSnapshot::genesis();
        assert_eq!(genesis.version(), 0);
        assert_eq!(genesis.root(), Hash::ZERO);
        assert_eq!(genesis.size(), 0);
    }

    #[test]
    fn test_seal_computes_root() {
        let snap = StateSnapshot::seal(1, BTreeMap::from([(b"k".to_vec(), b"v".to_vec())]));
        assert_eq!(snap.root(), hash_leaf(b"k", b"v"));
    }

    #[test]
    fn test_reads() {
        let snap = sample();
        assert_eq!(snap.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(snap.get(b"c").unwrap(), None);
        assert!(snap.has(b"d").unwrap());
        assert_eq!(snap.iter_prefix(b"d").unwrap().len(), 1);
    }

    #[test]
    fn test_index_of() {
        let snap = sample();
        assert_eq!(snap.index_of(b"a"), 0);
        assert_eq!(snap.index_of(b"b"), 0);
        assert_eq!(snap.index_of(b"c"), 1);
        assert_eq!(snap.index_of(b"d"), 1);
        assert_eq!(snap.index_of(b"z"), 2);
    }

    #[test]
    fn test_clone_shares_contents() {
        let snap = sample();
        let copy = snap.clone();
        assert!(Arc::ptr_eq(&snap.data, &copy.data));
    }
}
