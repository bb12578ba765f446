//! Node configuration.
//!
//! Read from a TOML file. Every field has a default, so an empty file (or no
//! file at all) yields a runnable in-memory node.
//!
//! ```toml
//! data_dir = "./data"
//! backend = "rocksdb"
//! log_level = "debug"
//!
//! [chain]
//! chain_id = "kestrel-dev"
//!
//! [store]
//! keep_recent = 100
//!
//! [[genesis]]
//! pub_key = "0A1B..."
//! power = 10
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use kestrel_chain::ChainConfig;
use kestrel_core::{PublicKey, ValidatorRecord};
use kestrel_storage::StoreConfig;

/// Which store backs the application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Volatile; state is lost on exit.
    #[default]
    Memory,
    /// Persistent, under `data_dir`.
    Rocksdb,
}

/// A genesis validator entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    /// Hex-encoded public key.
    pub pub_key: String,
    pub power: u64,
}

/// Top-level node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub backend: Backend,
    /// Default log filter; `RUST_LOG` wins when set.
    pub log_level: String,
    pub chain: ChainConfig,
    pub store: StoreConfig,
    pub genesis: Vec<GenesisValidator>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./kestrel-data"),
            backend: Backend::default(),
            log_level: "info".into(),
            chain: ChainConfig::default(),
            store: StoreConfig::default(),
            genesis: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::from_toml(&content)
                    .with_context(|| format!("parsing config {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Decode the genesis entries into validator records.
    pub fn genesis_validators(&self) -> anyhow::Result<Vec<ValidatorRecord>> {
        self.genesis
            .iter()
            .map(|entry| {
                let pub_key = PublicKey::from_hex(&entry.pub_key)
                    .with_context(|| format!("genesis validator {:?}", entry.pub_key))?;
                Ok(ValidatorRecord::new(pub_key, entry.power))
            })
            .collect()
    }
}
