//! Storage traits.

use kestrel_core::{Hash, Result};

use crate::snapshot::StateSnapshot;

/// Read access to a view of the state.
pub trait StateReader {
    /// Get the value stored under a key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Check if a key exists.
    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// A versioned key/value store.
///
/// Reads through [`StateReader`] see the working view: the latest committed
/// version plus every mutation staged since. [`save_version`] seals the
/// working view into the next version.
///
/// [`save_version`]: StateStore::save_version
pub trait StateStore: StateReader + Send {
    /// Stage a write.
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;

    /// Stage a removal.
    fn remove(&mut self, key: &[u8]) -> Result<()>;

    /// Root fingerprint of the working view.
    fn working_root(&self) -> Hash;

    /// Seal staged mutations as version `latest_version() + 1`.
    fn save_version(&mut self) -> Result<StateSnapshot>;

    /// Height of the latest committed version.
    fn latest_version(&self) -> u64 {
        self.latest().version()
    }

    /// The latest committed version.
    fn latest(&self) -> StateSnapshot;

    /// A retained committed version.
    fn snapshot_at(&self, version: u64) -> Result<StateSnapshot>;

    /// Flush pending writes to durable storage.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
