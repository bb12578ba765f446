//! Validator-set management.
//!
//! Two structures with different lifetimes:
//! - [`GenesisAuthorization`]: built once by `InitChain`, then frozen for the
//!   life of the process. Gates who may submit account and validator changes.
//! - [`PendingValidatorUpdates`]: the diff accumulated by the open block,
//!   recreated by every `BeginBlock` and handed out by `EndBlock`.
//!
//! [`resolve`] applies add/update/remove semantics to the store and is
//! shared by chain initialization and validator-change execution.
//! [`enumerate`] lists the current set from the store and
//! [`enumerate_accounts`] the registered accounts.

use std::collections::BTreeMap;

use tracing::debug;

use kestrel_core::{Account, Namespace, PublicKey, StateKey, ValidatorRecord};
use kestrel_storage::{StateReader, StateStore};

use crate::error::{FatalError, TxError};

/// Signers allowed to submit account registrations and validator changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenesisAuthorization {
    powers: BTreeMap<PublicKey, u64>,
}

impl GenesisAuthorization {
    /// An empty table (nothing authorized).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if a signer may submit privileged transactions.
    pub fn is_authorized(&self, signer: &PublicKey) -> bool {
        self.power(signer) > 0
    }

    /// Genesis power of a signer, 0 if unknown.
    pub fn power(&self, signer: &PublicKey) -> u64 {
        self.powers.get(signer).copied().unwrap_or(0)
    }

    /// Get the number of authorized signers.
    pub fn len(&self) -> usize {
        self.powers.len()
    }

    /// Check if no signer is authorized.
    pub fn is_empty(&self) -> bool {
        self.powers.is_empty()
    }

    /// Iterator over authorized signers and their genesis power.
    pub fn iter(&self) -> impl Iterator<Item = (&PublicKey, u64)> {
        self.powers.iter().map(|(k, p)| (k, *p))
    }

    pub(crate) fn insert(&mut self, signer: PublicKey, power: u64) {
        self.powers.insert(signer, power);
    }
}

impl FromIterator<(PublicKey, u64)> for GenesisAuthorization {
    fn from_iter<I: IntoIterator<Item = (PublicKey, u64)>>(iter: I) -> Self {
        Self {
            powers: iter.into_iter().filter(|(_, p)| *p > 0).collect(),
        }
    }
}

/// Ordered validator changes of the open block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingValidatorUpdates {
    updates: Vec<ValidatorRecord>,
}

impl PendingValidatorUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change that has already been applied to the store.
    pub fn push(&mut self, record: ValidatorRecord) {
        self.updates.push(record);
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn as_slice(&self) -> &[ValidatorRecord] {
        &self.updates
    }

    /// Hand the accumulated diff out, leaving the log empty.
    pub fn take(&mut self) -> Vec<ValidatorRecord> {
        std::mem::take(&mut self.updates)
    }
}

/// Apply a validator record to the store.
///
/// `power == 0` removes an existing record and fails with Unauthorized if
/// there is none. Any other power adds or overwrites the record.
pub fn resolve<S>(record: &ValidatorRecord, store: &mut S) -> Result<(), TxError>
where
    S: StateStore + ?Sized,
{
    let key = record.key().encode();

    if record.is_removal() {
        if !store.has(&key)? {
            return Err(TxError::unauthorized(format!(
                "Cannot remove non-existent validator {}",
                hex::encode_upper(&key)
            )));
        }
        store.remove(&key)?;
        debug!(validator = %record.pub_key, "removed validator");
    } else {
        let value = record.encode()?;
        store.set(key, value)?;
        debug!(validator = %record.pub_key, power = record.power, "set validator");
    }
    Ok(())
}

/// List every validator in the store, in key order.
///
/// A record that does not decode is corruption and is never skipped.
pub fn enumerate<R>(state: &R) -> Result<Vec<ValidatorRecord>, FatalError>
where
    R: StateReader + ?Sized,
{
    let entries = state
        .iter_prefix(Namespace::Validator.prefix())
        .map_err(|e| FatalError::storage("enumerate validators", e.to_string()))?;

    entries
        .into_iter()
        .map(|(key, value)| {
            let corrupt = |source| FatalError::CorruptValidator {
                key: hex::encode(&key),
                source,
            };
            let record = ValidatorRecord::decode(&value).map_err(corrupt)?;
            // The key must agree with the record it stores.
            match StateKey::decode(&key) {
                StateKey::Validator(pub_key) if pub_key == record.pub_key => Ok(record),
                _ => Err(corrupt(kestrel_core::Error::corruption(
                    "record key does not match its public key",
                ))),
            }
        })
        .collect()
}

/// List every registered account in the store, in key order.
pub fn enumerate_accounts<R>(state: &R) -> Result<Vec<Account>, FatalError>
where
    R: StateReader + ?Sized,
{
    let entries = state
        .iter_prefix(Namespace::Account.prefix())
        .map_err(|e| FatalError::storage("enumerate accounts", e.to_string()))?;

    entries
        .into_iter()
        .map(|(key, value)| {
            Account::decode(&key, &value).map_err(|source| FatalError::CorruptAccount {
                key: hex::encode(&key),
                source,
            })
        })
        .collect()
}
