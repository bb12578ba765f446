//! Versioned state storage for Kestrel.
//!
//! Provides:
//! - [`StateStore`]: point reads and writes on a working view, prefix
//!   iteration, and sealing the working view into the next version
//! - [`StateSnapshot`]: an immutable committed version with its root
//! - [`MemoryStore`] and [`RocksStore`] implementations
//!
//! # Versions
//!
//! ```rust
//! use kestrel_storage::{MemoryStore, StateReader, StateStore};
//!
//! let mut store = MemoryStore::default();
//! store.set(b"name".to_vec(), b"kestrel".to_vec()).unwrap();
//!
//! // Staged writes are visible to the working view only.
//! assert!(store.has(b"name").unwrap());
//! assert!(!store.latest().has(b"name").unwrap());
//!
//! let v1 = store.save_version().unwrap();
//! assert_eq!(v1.version(), 1);
//! assert_eq!(store.latest().get(b"name").unwrap(), Some(b"kestrel".to_vec()));
//! ```

mod batch;
mod iter;
mod memory;
mod rocks;
mod snapshot;
mod traits;

pub use batch::{BatchOp, WorkingSet};
pub use iter::{next_prefix, prefix_range, scan_prefix, MergedIter};
pub use memory::{MemoryStore, StoreConfig, DEFAULT_KEEP_RECENT};
pub use rocks::RocksStore;
pub use snapshot::StateSnapshot;
pub use traits::{StateReader, StateStore};
