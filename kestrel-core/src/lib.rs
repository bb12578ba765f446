//! Kestrel Core - Fundamental types for the Kestrel state machine.
//!
//! This crate provides the deterministic building blocks shared by storage
//! and the chain application:
//!
//! - [`crypto`] - Hashing (BLAKE3), public keys and signature verification
//! - [`keys`] - The namespaced state key schema
//! - [`records`] - Accounts and validator records as stored in state
//! - [`tx`] - The transaction codec
//! - [`merkle`] - State root computation
//!
//! # Example
//!
//! ```rust
//! use kestrel_core::{make_validator_change_tx, PublicKey, Transaction, TxKind};
//!
//! let pk = PublicKey::from_hex("0a0b0c").unwrap();
//! let tx = Transaction::parse(&make_validator_change_tx(&pk, 10));
//!
//! assert_eq!(tx.kind(), TxKind::ValidatorChange);
//! assert_eq!(tx.to_validator().unwrap().power, 10);
//! ```

pub mod crypto;
pub mod error;
pub mod keys;
pub mod merkle;
pub mod records;
pub mod tx;

#[cfg(test)]
mod proptest;

// Re-exports for convenience
pub use crypto::{hash_leaf, hash_pair, Ed25519Verifier, Hash, PublicKey, Sig, SignatureVerifier};
pub use error::{Error, ErrorCode, ResponseCode, Result};
pub use keys::{Namespace, StateKey};
pub use merkle::{compute_root, compute_state_root};
pub use records::{Account, ValidatorRecord};
pub use tx::{
    make_account_register_tx, make_signed_tx, make_validator_change_tx, KvWrite, SignedEnvelope,
    Transaction, TxKind,
};
