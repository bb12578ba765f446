//! In-memory versioned store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use kestrel_core::{compute_state_root, Error, Hash, Result};

use crate::batch::{BatchOp, WorkingSet};
use crate::iter::MergedIter;
use crate::snapshot::StateSnapshot;
use crate::traits::{StateReader, StateStore};

/// Versions kept queryable when nothing else is configured.
pub const DEFAULT_KEEP_RECENT: u64 = 100;

/// Version retention settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of committed versions to keep queryable, counting the latest.
    /// Zero keeps every version, which grows without bound.
    pub keep_recent: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            keep_recent: DEFAULT_KEEP_RECENT,
        }
    }
}

impl StoreConfig {
    /// Keep only the `n` most recent versions.
    pub fn keep_recent(n: u64) -> Self {
        Self { keep_recent: n }
    }

    /// Oldest version retained once `latest` is sealed, or `None` when
    /// every version is kept.
    pub fn retention_floor(&self, latest: u64) -> Option<u64> {
        match self.keep_recent {
            0 => None,
            keep => Some(latest.saturating_sub(keep - 1)),
        }
    }
}

/// A versioned store held entirely in memory.
///
/// Also the in-memory half of [`RocksStore`](crate::RocksStore), which
/// persists what this store seals.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    config: StoreConfig,
    latest: StateSnapshot,
    history: BTreeMap<u64, StateSnapshot>,
    working: WorkingSet,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl MemoryStore {
    /// Create an empty store at version 0.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_history(config, StateSnapshot::genesis(), Vec::new())
    }

    /// Resume from a sealed version plus older versions rebuilt elsewhere.
    pub(crate) fn with_history(
        config: StoreConfig,
        latest: StateSnapshot,
        older: Vec<StateSnapshot>,
    ) -> Self {
        let mut history: BTreeMap<u64, StateSnapshot> =
            older.into_iter().map(|s| (s.version(), s)).collect();
        history.insert(latest.version(), latest.clone());
        let mut store = Self {
            config,
            latest,
            history,
            working: WorkingSet::new(),
        };
        store.prune();
        store
    }

    /// Retention settings.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Staged mutations of the working view.
    pub fn working(&self) -> &WorkingSet {
        &self.working
    }

    /// Versions still retained, oldest first.
    pub fn retained_versions(&self) -> Vec<u64> {
        self.history.keys().copied().collect()
    }

    /// Seal the working set and return it together with the ops it applied.
    pub(crate) fn seal(&mut self) -> Result<(StateSnapshot, BTreeMap<Vec<u8>, BatchOp>)> {
        let version = self
            .latest
            .version()
            .checked_add(1)
            .ok_or_else(|| Error::internal("version overflow"))?;

        let ops = self.working.take();
        let snapshot = if ops.is_empty() {
            self.latest.advance(version)
        } else {
            let mut data = self.latest.data().clone();
            WorkingSet::apply_to(ops.clone(), &mut data);
            StateSnapshot::seal(version, data)
        };
        self.latest = snapshot.clone();
        self.history.insert(version, snapshot.clone());
        self.prune();

        debug!(version, root = %snapshot.root(), size = snapshot.size(), "sealed version");
        Ok((snapshot, ops))
    }

    fn prune(&mut self) {
        if let Some(floor) = self.config.retention_floor(self.latest.version()) {
            self.history = self.history.split_off(&floor);
        }
    }
}

impl StateReader for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.working.get(key) {
            Some(op) => Ok(op.value().map(<[u8]>::to_vec)),
            None => self.latest.get(key),
        }
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(
            MergedIter::with_prefix(self.latest.data(), self.working.ops(), prefix)
                .map(|(k, v)| (k.to_vec(), v.to_vec()))
                .collect(),
        )
    }
}

impl StateStore for MemoryStore {
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.working.set(key, value);
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> Result<()> {
        self.working.remove(key.to_vec());
        Ok(())
    }

    fn working_root(&self) -> Hash {
        if self.working.is_empty() {
            return self.latest.root();
        }
        compute_state_root(MergedIter::new(self.latest.data(), self.working.ops()))
    }

    fn save_version(&mut self) -> Result<StateSnapshot> {
        self.seal().map(|(snapshot, _)| snapshot)
    }

    fn latest(&self) -> StateSnapshot {
        self.latest.clone()
    }

    fn snapshot_at(&self, version: u64) -> Result<StateSnapshot> {
        self.history
            .get(&version)
            .cloned()
            .ok_or_else(|| Error::version_not_found(version))
    }
}
