//! State key schema.
//!
//! Every key written to the state store is built through [`StateKey`]. The
//! account and validator namespaces are fixed string prefixes; user keys
//! from key/value writes live outside both and may not start with either
//! prefix, so the three namespaces can never collide.

use crate::crypto::PublicKey;
use crate::error::{Error, ErrorCode, Result};

/// Prefix of the account namespace.
pub(crate) const ACCOUNT_PREFIX: &[u8] = b"acc:";

/// Prefix of the validator namespace.
pub(crate) const VALIDATOR_PREFIX: &[u8] = b"val:";

/// All reserved namespace prefixes.
const RESERVED_PREFIXES: &[&[u8]] = &[ACCOUNT_PREFIX, VALIDATOR_PREFIX];

/// Namespace a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Account,
    Validator,
    User,
}

impl Namespace {
    /// Classify a raw store key.
    pub fn of(raw: &[u8]) -> Self {
        if raw.starts_with(ACCOUNT_PREFIX) {
            Namespace::Account
        } else if raw.starts_with(VALIDATOR_PREFIX) {
            Namespace::Validator
        } else {
            Namespace::User
        }
    }

    /// Iteration prefix for the namespace (empty for user keys).
    pub fn prefix(self) -> &'static [u8] {
        match self {
            Namespace::Account => ACCOUNT_PREFIX,
            Namespace::Validator => VALIDATOR_PREFIX,
            Namespace::User => b"",
        }
    }
}

/// A typed state key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateKey {
    /// Power of a registered account.
    Account(PublicKey),
    /// Canonically encoded validator record.
    Validator(PublicKey),
    /// Caller-defined key from a key/value write.
    User(Vec<u8>),
}

impl StateKey {
    /// Key of an account record.
    pub fn account(pub_key: &PublicKey) -> Self {
        StateKey::Account(pub_key.clone())
    }

    /// Key of a validator record.
    pub fn validator(pub_key: &PublicKey) -> Self {
        StateKey::Validator(pub_key.clone())
    }

    /// Key for a caller-defined write.
    ///
    /// Rejects empty keys and keys inside a reserved namespace.
    pub fn user(raw: impl Into<Vec<u8>>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(Error::InvalidPayload {
                code: ErrorCode::InvalidFormat,
                message: "key must not be empty".into(),
            });
        }
        if let Some(prefix) = RESERVED_PREFIXES.iter().find(|p| raw.starts_with(p)) {
            return Err(Error::InvalidPayload {
                code: ErrorCode::InvalidFormat,
                message: format!(
                    "key uses reserved prefix {:?}",
                    String::from_utf8_lossy(prefix)
                ),
            });
        }
        Ok(StateKey::User(raw))
    }

    /// The namespace of this key.
    pub fn namespace(&self) -> Namespace {
        match self {
            StateKey::Account(_) => Namespace::Account,
            StateKey::Validator(_) => Namespace::Validator,
            StateKey::User(_) => Namespace::User,
        }
    }

    /// Encode into the raw store key.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            StateKey::Account(pk) => prefixed(ACCOUNT_PREFIX, pk.as_bytes()),
            StateKey::Validator(pk) => prefixed(VALIDATOR_PREFIX, pk.as_bytes()),
            StateKey::User(raw) => raw.clone(),
        }
    }

    /// Decode a raw store key.
    pub fn decode(raw: &[u8]) -> Self {
        match Namespace::of(raw) {
            Namespace::Account => {
                StateKey::Account(PublicKey::from_bytes(&raw[ACCOUNT_PREFIX.len()..]))
            }
            Namespace::Validator => {
                StateKey::Validator(PublicKey::from_bytes(&raw[VALIDATOR_PREFIX.len()..]))
            }
            Namespace::User => StateKey::User(raw.to_vec()),
        }
    }
}

fn prefixed(prefix: &[u8], body: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + body.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(body);
    key
}
