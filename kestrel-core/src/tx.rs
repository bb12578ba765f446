//! Transaction codec.
//!
//! Inbound bytes are either a raw textual payload or a JSON signed envelope
//! wrapping one:
//!
//! ```text
//! key=value                        key/value write
//! acc:<hex pubkey>/<power>         account registration
//! val:<hex pubkey>/<power>         validator change (power 0 removes)
//! {"payload": "...", "signer": "<hex>", "signature": "<hex>"}
//! ```
//!
//! [`Transaction::parse`] never fails: anything else becomes
//! [`TxKind::Unknown`]. Decoding a body is a separate, fallible step.

use serde::{Deserialize, Serialize};

use crate::crypto::{PublicKey, Sig};
use crate::error::{Error, Result};
use crate::keys::{StateKey, ACCOUNT_PREFIX, VALIDATOR_PREFIX};
use crate::records::{Account, ValidatorRecord};

/// The closed set of transaction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    KeyValueWrite,
    AccountRegister,
    ValidatorChange,
    Unknown,
}

impl TxKind {
    /// Classify a payload by its shape.
    pub fn classify(payload: &[u8]) -> Self {
        if payload.starts_with(VALIDATOR_PREFIX) {
            TxKind::ValidatorChange
        } else if payload.starts_with(ACCOUNT_PREFIX) {
            TxKind::AccountRegister
        } else if payload.contains(&b'=') {
            TxKind::KeyValueWrite
        } else {
            TxKind::Unknown
        }
    }
}

/// A decoded key/value write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvWrite {
    pub key: StateKey,
    pub value: Vec<u8>,
}

/// Signed wrapper around a textual payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignedEnvelope {
    pub payload: String,
    pub signer: String,
    pub signature: String,
}

/// A parsed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    kind: TxKind,
    payload: Vec<u8>,
    signer: Option<PublicKey>,
    signature: Option<Sig>,
}

impl Transaction {
    /// Parse inbound bytes. Pure and infallible.
    pub fn parse(bytes: &[u8]) -> Self {
        if bytes.first() == Some(&b'{') {
            if let Some(tx) = Self::parse_envelope(bytes) {
                return tx;
            }
        }
        Self {
            kind: TxKind::classify(bytes),
            payload: bytes.to_vec(),
            signer: None,
            signature: None,
        }
    }

    fn parse_envelope(bytes: &[u8]) -> Option<Self> {
        let envelope: SignedEnvelope = serde_json::from_slice(bytes).ok()?;
        let payload = envelope.payload.into_bytes();
        // Undecodable signer or signature fields make the whole envelope unrecognized.
        let signer = hex::decode(&envelope.signer).ok()?;
        let signature = hex::decode(&envelope.signature).ok()?;
        Some(Self {
            kind: TxKind::classify(&payload),
            payload,
            signer: (!signer.is_empty()).then(|| PublicKey::from_bytes(signer)),
            signature: Some(Sig::from_bytes(signature)),
        })
    }

    pub fn kind(&self) -> TxKind {
        self.kind
    }

    /// The inner payload (the envelope is stripped).
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn signer(&self) -> Option<&PublicKey> {
        self.signer.as_ref()
    }

    pub fn signature(&self) -> Option<&Sig> {
        self.signature.as_ref()
    }

    /// Check if the transaction carries a non-empty signature.
    pub fn is_signed(&self) -> bool {
        self.signature.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// Decode a key/value write body.
    pub fn to_kv_write(&self) -> Result<KvWrite> {
        self.expect_kind(TxKind::KeyValueWrite)?;
        let split = self
            .payload
            .iter()
            .position(|b| *b == b'=')
            .ok_or_else(|| Error::invalid_payload("Expected 'key=value'"))?;
        let key = StateKey::user(&self.payload[..split])?;
        Ok(KvWrite {
            key,
            value: self.payload[split + 1..].to_vec(),
        })
    }

    /// Decode an account registration body.
    pub fn to_account(&self) -> Result<Account> {
        self.expect_kind(TxKind::AccountRegister)?;
        let (pub_key, power) = decode_key_power(&self.payload[ACCOUNT_PREFIX.len()..])?;
        Ok(Account::new(pub_key, power))
    }

    /// Decode a validator change body.
    pub fn to_validator(&self) -> Result<ValidatorRecord> {
        self.expect_kind(TxKind::ValidatorChange)?;
        let (pub_key, power) = decode_key_power(&self.payload[VALIDATOR_PREFIX.len()..])?;
        Ok(ValidatorRecord::new(pub_key, power))
    }

    fn expect_kind(&self, kind: TxKind) -> Result<()> {
        if self.kind != kind {
            return Err(Error::invalid_payload(format!(
                "expected {kind:?} transaction, got {:?}",
                self.kind
            )));
        }
        Ok(())
    }
}

/// Decode `<hex pubkey>/<decimal power>`.
fn decode_key_power(body: &[u8]) -> Result<(PublicKey, u64)> {
    let body = std::str::from_utf8(body)
        .map_err(|_| Error::invalid_payload("payload is not valid UTF-8"))?;
    let parts: Vec<&str> = body.split('/').collect();
    if parts.len() != 2 {
        return Err(Error::invalid_payload(format!(
            "Expected 'pubkey/power'. Got {parts:?}"
        )));
    }
    let (pub_key_hex, power_str) = (parts[0], parts[1]);

    let pub_key = PublicKey::from_hex(pub_key_hex)
        .map_err(|_| Error::invalid_payload(format!("Pubkey ({pub_key_hex}) is invalid hex")))?;
    let power = power_str
        .parse::<u64>()
        .map_err(|_| Error::invalid_payload(format!("Power ({power_str}) is not an int")))?;

    Ok((pub_key, power))
}

/// Build the textual payload of a validator change.
pub fn make_validator_change_tx(pub_key: &PublicKey, power: u64) -> Vec<u8> {
    format!("val:{}/{}", pub_key.to_hex_upper(), power).into_bytes()
}

/// Build the textual payload of an account registration.
pub fn make_account_register_tx(pub_key: &PublicKey, power: u64) -> Vec<u8> {
    format!("acc:{}/{}", pub_key.to_hex_upper(), power).into_bytes()
}

/// Wrap a textual payload in a signed envelope.
pub fn make_signed_tx(payload: &[u8], signer: &PublicKey, signature: &Sig) -> Result<Vec<u8>> {
    let payload = std::str::from_utf8(payload)
        .map_err(|_| Error::invalid_payload("payload is not valid UTF-8"))?;
    let envelope = SignedEnvelope {
        payload: payload.to_string(),
        signer: hex::encode(signer.as_bytes()),
        signature: hex::encode(signature.as_bytes()),
    };
    Ok(serde_json::to_vec(&envelope)?)
}
