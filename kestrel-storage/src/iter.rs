//! Ordered iteration over state.
//!
//! Two building blocks:
//! - [`prefix_range`]: the key range covering every key with a prefix
//! - [`MergedIter`]: a committed map viewed through a [`WorkingSet`] overlay
//!
//! [`WorkingSet`]: crate::WorkingSet

use std::cmp::Ordering;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::ops::Bound;

use crate::batch::BatchOp;

/// Smallest key strictly greater than every key starting with `prefix`.
///
/// Returns `None` when no such key exists (empty prefix or all `0xff`).
pub fn next_prefix(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut next = prefix.to_vec();
    while let Some(last) = next.pop() {
        if last < u8::MAX {
            next.push(last + 1);
            return Some(next);
        }
    }
    None
}

/// Range bounds selecting all keys with `prefix`.
pub fn prefix_range(prefix: &[u8]) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let upper = match next_prefix(prefix) {
        Some(end) => Bound::Excluded(end),
        None => Bound::Unbounded,
    };
    (Bound::Included(prefix.to_vec()), upper)
}

/// Iterate `data` restricted to keys with `prefix`.
pub fn scan_prefix<'a>(
    data: &'a BTreeMap<Vec<u8>, Vec<u8>>,
    prefix: &[u8],
) -> btree_map::Range<'a, Vec<u8>, Vec<u8>> {
    data.range(prefix_range(prefix))
}

type Base<'a> = Peekable<btree_map::Range<'a, Vec<u8>, Vec<u8>>>;
type Overlay<'a> = Peekable<btree_map::Range<'a, Vec<u8>, BatchOp>>;

/// Sorted merge of committed entries and staged ops.
///
/// Overlay entries shadow base entries with the same key; staged removals
/// hide the key entirely.
pub struct MergedIter<'a> {
    base: Base<'a>,
    overlay: Overlay<'a>,
}

impl<'a> MergedIter<'a> {
    /// Merge the full contents of both maps.
    pub fn new(base: &'a BTreeMap<Vec<u8>, Vec<u8>>, overlay: &'a BTreeMap<Vec<u8>, BatchOp>) -> Self {
        Self::with_prefix(base, overlay, &[])
    }

    /// Merge only keys with `prefix`.
    pub fn with_prefix(
        base: &'a BTreeMap<Vec<u8>, Vec<u8>>,
        overlay: &'a BTreeMap<Vec<u8>, BatchOp>,
        prefix: &[u8],
    ) -> Self {
        Self {
            base: base.range(prefix_range(prefix)).peekable(),
            overlay: overlay.range(prefix_range(prefix)).peekable(),
        }
    }
}

impl<'a> Iterator for MergedIter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let order = match (self.base.peek(), self.overlay.peek()) {
                (None, None) => return None,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some((bk, _)), Some((ok, _))) => bk.cmp(ok),
            };

            if order == Ordering::Less {
                let (key, value) = self.base.next()?;
                return Some((key.as_slice(), value.as_slice()));
            }
            if order == Ordering::Equal {
                // Shadowed by the overlay.
                self.base.next();
            }

            let (key, op) = self.overlay.next()?;
            match op {
                BatchOp::Set(value) => return Some((key.as_slice(), value.as_slice())),
                BatchOp::Remove => continue,
            }
        }
    }
}
