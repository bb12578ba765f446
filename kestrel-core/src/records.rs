//! Domain records stored in state.
//!
//! - [`Account`] values are stored as the decimal text of the power.
//! - [`ValidatorRecord`] values use a canonical bincode layout (fixed-width
//!   integers, no trailing bytes) so enumeration decodes exactly what
//!   execution wrote.

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::error::{Error, Result};
use crate::keys::StateKey;

fn canonical() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_big_endian()
        .reject_trailing_bytes()
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub pub_key: PublicKey,
    pub power: u64,
}

impl Account {
    pub fn new(pub_key: PublicKey, power: u64) -> Self {
        Self { pub_key, power }
    }

    /// Store key of this account.
    pub fn key(&self) -> StateKey {
        StateKey::account(&self.pub_key)
    }

    /// Stored value: the power as decimal text.
    pub fn encode_value(&self) -> Vec<u8> {
        self.power.to_string().into_bytes()
    }

    /// Rebuild an account from a raw store entry.
    ///
    /// The key must lie in the account namespace and the value must be the
    /// decimal power.
    pub fn decode(key: &[u8], value: &[u8]) -> Result<Self> {
        let pub_key = match StateKey::decode(key) {
            StateKey::Account(pub_key) if !pub_key.is_empty() => pub_key,
            _ => return Err(Error::corruption("key is not an account key")),
        };
        Ok(Self::new(pub_key, decode_power(value)?))
    }
}

fn decode_power(value: &[u8]) -> Result<u64> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| Error::corruption("account power is not a decimal integer"))
}

/// A stake-weighted validator membership entry.
///
/// `power == 0` means "remove this validator".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub pub_key: PublicKey,
    pub power: u64,
}

impl ValidatorRecord {
    pub fn new(pub_key: PublicKey, power: u64) -> Self {
        Self { pub_key, power }
    }

    /// Check if this record asks for removal.
    pub fn is_removal(&self) -> bool {
        self.power == 0
    }

    /// Store key of this validator.
    pub fn key(&self) -> StateKey {
        StateKey::validator(&self.pub_key)
    }

    /// Canonical binary encoding.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(canonical().serialize(self)?)
    }

    /// Decode a canonically encoded record.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(canonical().deserialize(bytes)?)
    }
}
