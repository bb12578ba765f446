//! RocksDB-backed versioned store.
//!
//! RocksDB holds the latest committed contents, the latest height, the root
//! of every committed height, and an undo log of prior values for the
//! retained heights. The working view and retained history live in an
//! embedded [`MemoryStore`]; each `save_version` writes the sealed ops, their
//! undo records and the pruning of expired undo records in one atomic
//! `WriteBatch`. On open the retained history is rebuilt from the undo log,
//! so a restarted store answers the same versions as one that kept running.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB,
};
use tracing::{debug, info};

use kestrel_core::{Error, Hash, Result};

use crate::batch::BatchOp;
use crate::memory::{MemoryStore, StoreConfig};
use crate::snapshot::StateSnapshot;
use crate::traits::{StateReader, StateStore};

/// Column family names.
mod cf {
    pub const DEFAULT: &str = "default";
    pub const STATE: &str = "state";
    pub const ROOTS: &str = "roots";
    pub const META: &str = "meta";
    /// `height BE ++ key -> prior value` for each key a height changed.
    pub const UNDO: &str = "undo";
}

/// Metadata keys.
mod meta {
    pub const LATEST_HEIGHT: &[u8] = b"latest_height";
    /// Oldest height the undo log can still rebuild.
    pub const HISTORY_FLOOR: &[u8] = b"history_floor";
}

const UNDO_ABSENT: u8 = 0;
const UNDO_PRESENT: u8 = 1;

/// RocksDB-backed store.
pub struct RocksStore {
    db: Arc<DB>,
    inner: MemoryStore,
    /// Keeps a temporary directory alive for the lifetime of the store.
    _temp: Option<tempfile::TempDir>,
}

impl RocksStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening RocksDB at {:?}", path);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = [cf::DEFAULT, cf::STATE, cf::ROOTS, cf::META, cf::UNDO]
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| Error::storage(e.to_string()))?;
        let db = Arc::new(db);

        let latest = load_latest(&db)?;
        info!(
            height = latest.version(),
            root = %latest.root(),
            size = latest.size(),
            "Loaded committed state"
        );

        let older = load_history(&db, &latest, &config)?;
        debug!(versions = older.len(), "Rebuilt retained history");

        Ok(Self {
            db,
            inner: MemoryStore::with_history(config, latest, older),
            _temp: None,
        })
    }

    /// Open with a temporary directory (for testing).
    pub fn open_temp() -> Result<Self> {
        Self::open_temp_with(StoreConfig::default())
    }

    /// Open with a temporary directory and custom retention.
    pub fn open_temp_with(config: StoreConfig) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let mut store = Self::open(dir.path(), config)?;
        store._temp = Some(dir);
        Ok(store)
    }

    /// Versions still retained, oldest first.
    pub fn retained_versions(&self) -> Vec<u64> {
        self.inner.retained_versions()
    }

    /// Root stored for a committed height, including heights no longer
    /// retained in memory.
    pub fn root_at(&self, height: u64) -> Result<Option<Hash>> {
        get_cf(&self.db, cf::ROOTS, &height.to_be_bytes())?
            .map(|bytes| decode_hash(&bytes))
            .transpose()
    }

    fn persist(
        &self,
        previous: &StateSnapshot,
        snapshot: &StateSnapshot,
        ops: &BTreeMap<Vec<u8>, BatchOp>,
    ) -> Result<()> {
        let state_cf = cf_handle(&self.db, cf::STATE)?;
        let roots_cf = cf_handle(&self.db, cf::ROOTS)?;
        let meta_cf = cf_handle(&self.db, cf::META)?;
        let undo_cf = cf_handle(&self.db, cf::UNDO)?;

        let height = snapshot.version().to_be_bytes();
        let mut batch = WriteBatch::default();
        for (key, op) in ops {
            match op {
                BatchOp::Set(value) => batch.put_cf(&state_cf, key, value),
                BatchOp::Remove => batch.delete_cf(&state_cf, key),
            }
            batch.put_cf(
                &undo_cf,
                undo_key(snapshot.version(), key),
                encode_undo(previous.data().get(key)),
            );
        }
        batch.put_cf(&roots_cf, height, snapshot.root().as_bytes());
        batch.put_cf(&meta_cf, meta::LATEST_HEIGHT, height);

        // Rebuilding version `floor` needs undo records above it only.
        if let Some(floor) = self.inner.config().retention_floor(snapshot.version()) {
            if floor > 0 {
                batch.delete_range_cf(&undo_cf, 0u64.to_be_bytes(), (floor + 1).to_be_bytes());
                batch.put_cf(&meta_cf, meta::HISTORY_FLOOR, floor.to_be_bytes());
            }
        }

        self.db
            .write(batch)
            .map_err(|e| Error::storage_write(e.to_string()))?;

        debug!(
            height = snapshot.version(),
            ops = ops.len(),
            "Persisted version"
        );
        Ok(())
    }
}

fn cf_handle<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| Error::storage(format!("missing column family: {}", name)))
}

fn get_cf(db: &DB, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
    let cf = cf_handle(db, cf_name)?;
    db.get_cf(&cf, key)
        .map_err(|e| Error::storage(e.to_string()))
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::corruption("invalid u64 encoding"))?;
    Ok(u64::from_be_bytes(arr))
}

fn decode_hash(bytes: &[u8]) -> Result<Hash> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::corruption("invalid hash encoding"))?;
    Ok(Hash::from_bytes(arr))
}

/// Rebuild the latest committed snapshot and check it against its stored root.
fn load_latest(db: &DB) -> Result<StateSnapshot> {
    let height = match get_cf(db, cf::META, meta::LATEST_HEIGHT)? {
        Some(bytes) => decode_u64(&bytes)?,
        None => return Ok(StateSnapshot::genesis()),
    };

    let state_cf = cf_handle(db, cf::STATE)?;
    let mut data = BTreeMap::new();
    for item in db.iterator_cf(&state_cf, IteratorMode::Start) {
        let (key, value) = item.map_err(|e| Error::storage(e.to_string()))?;
        data.insert(key.into_vec(), value.into_vec());
    }

    let snapshot = StateSnapshot::seal(height, data);
    let stored_root = get_cf(db, cf::ROOTS, &height.to_be_bytes())?
        .map(|bytes| decode_hash(&bytes))
        .transpose()?
        .ok_or_else(|| Error::corruption(format!("missing root for height {}", height)))?;

    if stored_root != snapshot.root() {
        return Err(Error::corruption(format!(
            "root mismatch at height {}: stored {}, computed {}",
            height,
            stored_root,
            snapshot.root()
        )));
    }
    Ok(snapshot)
}

fn undo_key(height: u64, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + key.len());
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(key);
    out
}

fn encode_undo(prior: Option<&Vec<u8>>) -> Vec<u8> {
    match prior {
        Some(value) => {
            let mut out = Vec::with_capacity(1 + value.len());
            out.push(UNDO_PRESENT);
            out.extend_from_slice(value);
            out
        }
        None => vec![UNDO_ABSENT],
    }
}

fn decode_undo(bytes: &[u8]) -> Result<Option<Vec<u8>>> {
    match bytes.split_first() {
        Some((&UNDO_ABSENT, [])) => Ok(None),
        Some((&UNDO_PRESENT, value)) => Ok(Some(value.to_vec())),
        _ => Err(Error::corruption("invalid undo record")),
    }
}

/// Rebuild the retained versions below `latest` by walking the undo log
/// backwards. Each rebuilt version is checked against its stored root.
fn load_history(db: &DB, latest: &StateSnapshot, config: &StoreConfig) -> Result<Vec<StateSnapshot>> {
    let stored_floor = match get_cf(db, cf::META, meta::HISTORY_FLOOR)? {
        Some(bytes) => decode_u64(&bytes)?,
        None => 0,
    };
    let floor = config
        .retention_floor(latest.version())
        .unwrap_or(0)
        .max(stored_floor);

    let undo_cf = cf_handle(db, cf::UNDO)?;
    let mut data = latest.data().clone();
    let mut older = Vec::new();

    for height in (floor + 1..=latest.version()).rev() {
        let prefix = height.to_be_bytes();
        let iter = db.iterator_cf(undo_cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(|e| Error::storage(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let state_key = key[prefix.len()..].to_vec();
            match decode_undo(&value)? {
                Some(prior) => data.insert(state_key, prior),
                None => data.remove(&state_key),
            };
        }

        let version = height - 1;
        let snapshot = StateSnapshot::seal(version, data.clone());
        let expected = if version == 0 {
            Hash::ZERO
        } else {
            get_cf(db, cf::ROOTS, &version.to_be_bytes())?
                .map(|bytes| decode_hash(&bytes))
                .transpose()?
                .ok_or_else(|| Error::corruption(format!("missing root for height {}", version)))?
        };
        if snapshot.root() != expected {
            return Err(Error::corruption(format!(
                "undo log does not rebuild height {}: stored {}, computed {}",
                version,
                expected,
                snapshot.root()
            )));
        }
        older.push(snapshot);
    }

    Ok(older)
}

impl StateReader for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.iter_prefix(prefix)
    }
}

impl StateStore for RocksStore {
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.inner.set(key, value)
    }

    fn remove(&mut self, key: &[u8]) -> Result<()> {
        self.inner.remove(key)
    }

    fn working_root(&self) -> Hash {
        self.inner.working_root()
    }

    fn save_version(&mut self) -> Result<StateSnapshot> {
        let previous = self.inner.latest();
        let (snapshot, ops) = self.inner.seal()?;
        self.persist(&previous, &snapshot, &ops)?;
        Ok(snapshot)
    }

    fn latest(&self) -> StateSnapshot {
        self.inner.latest()
    }

    fn snapshot_at(&self, version: u64) -> Result<StateSnapshot> {
        self.inner.snapshot_at(version)
    }

    fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| Error::storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::ErrorCode;

    #[test]
    fn test_fresh_store_is_genesis() {
        let store = RocksStore::open_temp().unwrap();
        assert_eq!(store.latest_version(), 0);
        assert_eq!(store.latest().root(), Hash::ZERO);
        assert_eq!(store.root_at(1).unwrap(), None);
    }

    #[test]
    fn test_save_and_read() {
        let mut store = RocksStore::open_temp().unwrap();
        store.set(b"k".to_vec(), b"v".to_vec()).unwrap();
        let snap = store.save_version().unwrap();

        assert_eq!(snap.version(), 1);
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.root_at(1).unwrap(), Some(snap.root()));
    }

    #[test]
    fn test_reopen_resumes_latest() {
        let dir = tempfile::tempdir().unwrap();
        let (root, height) = {
            let mut store = RocksStore::open(dir.path(), StoreConfig::default()).unwrap();
            store.set(b"a".to_vec(), b"1".to_vec()).unwrap();
            store.set(b"b".to_vec(), b"2".to_vec()).unwrap();
            store.save_version().unwrap();
            store.remove(b"a").unwrap();
            let snap = store.save_version().unwrap();
            store.flush().unwrap();
            (snap.root(), snap.version())
        };

        let store = RocksStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(store.latest_version(), height);
        assert_eq!(store.latest().root(), root);
        assert_eq!(store.get(b"a").unwrap(), None);
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));

        // Retained history is rebuilt from the undo log.
        let v1 = store.snapshot_at(1).unwrap();
        assert_eq!(Some(v1.root()), store.root_at(1).unwrap());
        assert_eq!(v1.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.snapshot_at(0).unwrap().root(), Hash::ZERO);
    }

    #[test]
    fn test_reopen_answers_like_running_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::keep_recent(3);
        let mut running = RocksStore::open(dir.path(), config.clone()).unwrap();
        for i in 0..6u8 {
            running.set(vec![b'k', i % 2], vec![i]).unwrap();
            if i == 3 {
                running.remove(&[b'k', 0]).unwrap();
            }
            running.save_version().unwrap();
        }
        running.flush().unwrap();
        let expected = running.retained_versions();
        assert_eq!(expected, vec![4, 5, 6]);
        let roots: Vec<Hash> = expected
            .iter()
            .map(|v| running.snapshot_at(*v).unwrap().root())
            .collect();
        drop(running);

        let reopened = RocksStore::open(dir.path(), config).unwrap();
        assert_eq!(reopened.retained_versions(), expected);
        for (version, root) in expected.iter().zip(roots) {
            assert_eq!(reopened.snapshot_at(*version).unwrap().root(), root);
        }
        let err = reopened.snapshot_at(3).unwrap_err();
        assert_eq!(err.code(), ErrorCode::VersionNotFound);
    }

    #[test]
    fn test_undo_log_is_pruned() {
        let mut store = RocksStore::open_temp_with(StoreConfig::keep_recent(2)).unwrap();
        for i in 0..5u8 {
            store.set(vec![i], vec![i]).unwrap();
            store.save_version().unwrap();
        }

        let undo_cf = cf_handle(&store.db, cf::UNDO).unwrap();
        let heights: Vec<u64> = store
            .db
            .iterator_cf(undo_cf, IteratorMode::Start)
            .map(|item| decode_u64(&item.unwrap().0[..8]).unwrap())
            .collect();
        // Version 4 is the floor; only height 5 is needed to rebuild it.
        assert_eq!(heights, vec![5]);
    }

    #[test]
    fn test_unsaved_writes_are_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = RocksStore::open(dir.path(), StoreConfig::default()).unwrap();
            store.set(b"committed".to_vec(), b"1".to_vec()).unwrap();
            store.save_version().unwrap();
            store.set(b"pending".to_vec(), b"2".to_vec()).unwrap();
        }

        let store = RocksStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert!(store.has(b"committed").unwrap());
        assert!(!store.has(b"pending").unwrap());
    }
}
