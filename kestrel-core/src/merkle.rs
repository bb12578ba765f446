//! State root computation.
//!
//! The root fingerprint commits to every key/value pair of a version:
//!
//! 1. Each entry becomes a leaf via [`hash_leaf`], in ascending key order.
//! 2. The leaf level is padded to the next power of two by repeating the
//!    last leaf.
//! 3. Pairs are hashed with [`hash_pair`] until one node remains.
//!
//! An empty state has the zero root; a single entry is its own root.

use rayon::prelude::*;

use crate::crypto::{hash_leaf, hash_pair, Hash};

/// Above this many entries, leaves are hashed on the rayon pool.
const PARALLEL_THRESHOLD: usize = 1024;

/// Compute the root over entries that are already sorted by key.
///
/// Callers iterate a `BTreeMap` (or an equivalent ordered view), so the order
/// is the same on every replica.
pub fn compute_state_root<'a, I>(entries: I) -> Hash
where
    I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
{
    let entries: Vec<(&[u8], &[u8])> = entries.into_iter().collect();
    debug_assert!(
        entries.windows(2).all(|w| w[0].0 < w[1].0),
        "state entries must be strictly ascending"
    );

    let leaves: Vec<Hash> = if entries.len() >= PARALLEL_THRESHOLD {
        entries.par_iter().map(|(k, v)| hash_leaf(k, v)).collect()
    } else {
        entries.iter().map(|(k, v)| hash_leaf(k, v)).collect()
    };

    compute_root(leaves)
}

/// Fold a leaf level into a single root.
pub fn compute_root(mut hashes: Vec<Hash>) -> Hash {
    if hashes.is_empty() {
        return Hash::ZERO;
    }

    // Pad to power of 2
    let target_len = hashes.len().next_power_of_two();
    if let Some(last) = hashes.last().copied() {
        hashes.resize(target_len, last);
    }

    while hashes.len() > 1 {
        hashes = hashes
            .chunks(2)
            .map(|pair| hash_pair(pair[0], pair[1]))
            .collect();
    }

    hashes[0]
}
