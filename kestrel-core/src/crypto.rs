//! Cryptographic primitives for Kestrel.
//!
//! - BLAKE3 for content hashing (state leaves and merkle nodes)
//! - Opaque public keys and signatures, checked through [`SignatureVerifier`]
//! - Ed25519 as the default verifier

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Domain tag for state leaves.
const LEAF_TAG: u8 = 0x00;

/// Domain tag for interior merkle nodes.
const NODE_TAG: u8 = 0x01;

/// A 32-byte hash value.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The zero hash (root of an empty store).
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a hash from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(Error::invalid_hash(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Hash a single key/value entry into a state leaf.
///
/// Lengths are prefixed as u64 big-endian so that `("ab", "c")` and
/// `("a", "bc")` never collide, whatever the entry size.
pub fn hash_leaf(key: &[u8], value: &[u8]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_TAG]);
    hasher.update(&(key.len() as u64).to_be_bytes());
    hasher.update(key);
    hasher.update(&(value.len() as u64).to_be_bytes());
    hasher.update(value);
    Hash(*hasher.finalize().as_bytes())
}

/// Hash two child hashes to produce a parent hash.
pub fn hash_pair(left: Hash, right: Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_TAG]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash(*hasher.finalize().as_bytes())
}

/// A public key as delivered by the replication engine or a transaction.
///
/// The core never interprets the bytes; only a [`SignatureVerifier`] does.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Decode from a hex string. Empty keys are rejected.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|_| Error::invalid_key(format!("Pubkey ({s}) is invalid hex")))?;
        if bytes.is_empty() {
            return Err(Error::invalid_key("empty public key"));
        }
        Ok(Self(bytes))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Upper-case hex, the form used in textual payloads.
    pub fn to_hex_upper(&self) -> String {
        hex::encode_upper(&self.0)
    }

    /// Check if the key has no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = &self.0[..self.0.len().min(8)];
        write!(f, "PublicKey({})", hex::encode(shown))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// A detached signature over a transaction payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sig(Vec<u8>);

impl Sig {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Check if the signature carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Sig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = &self.0[..self.0.len().min(8)];
        write!(f, "Sig({})", hex::encode(shown))
    }
}

/// Verifies transaction signatures.
///
/// The state machine treats the signature scheme as opaque; the host
/// decides which scheme backs it.
pub trait SignatureVerifier: Send + Sync {
    /// Verify `signature` by `signer` over `message`.
    fn verify(&self, signer: &PublicKey, message: &[u8], signature: &Sig) -> Result<()>;
}

/// Ed25519 signature verification (strict mode).
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, signer: &PublicKey, message: &[u8], signature: &Sig) -> Result<()> {
        let key_bytes: [u8; 32] = signer
            .as_bytes()
            .try_into()
            .map_err(|_| Error::invalid_key("ed25519 public key must be 32 bytes"))?;
        let key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| Error::invalid_key(e.to_string()))?;
        let sig = ed25519_dalek::Signature::from_slice(signature.as_bytes())
            .map_err(|_| Error::invalid_signature())?;
        key.verify_strict(message, &sig)
            .map_err(|_| Error::invalid_signature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    #[test]
    fn test_hash_basic() {
        let h1 = hash_leaf(b"k", b"hello");
        let h2 = hash_leaf(b"k", b"hello");
        let h3 = hash_leaf(b"k", b"world");

        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_ne!(h1, Hash::ZERO);
    }

    #[test]
    fn test_leaf_preimage_layout() {
        let key = b"name";
        let value = b"satoshi";
        let mut preimage = vec![LEAF_TAG];
        preimage.extend_from_slice(&4u64.to_be_bytes());
        preimage.extend_from_slice(key);
        preimage.extend_from_slice(&7u64.to_be_bytes());
        preimage.extend_from_slice(value);

        let expected = Hash::from_bytes(*blake3::hash(&preimage).as_bytes());
        assert_eq!(hash_leaf(key, value), expected);
    }

    #[test]
    fn test_leaf_lengths_are_eight_bytes() {
        let leaf = hash_leaf(b"k", b"");
        let mut u32_layout = vec![LEAF_TAG];
        u32_layout.extend_from_slice(&1u32.to_be_bytes());
        u32_layout.extend_from_slice(b"k");
        u32_layout.extend_from_slice(&0u32.to_be_bytes());
        assert_ne!(*leaf.as_bytes(), *blake3::hash(&u32_layout).as_bytes());
    }

    #[test]
    fn test_hash_hex_roundtrip() {
        let h = hash_leaf(b"test", b"data");
        let h2 = Hash::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, h2);
    }

    #[test]
    fn test_hash_from_hex_wrong_length() {
        assert!(Hash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_hash_pair_order_matters() {
        let a = hash_leaf(b"a", b"");
        let b = hash_leaf(b"b", b"");
        assert_ne!(hash_pair(a, b), hash_pair(b, a));
    }

    #[test]
    fn test_leaf_length_prefix() {
        assert_ne!(hash_leaf(b"ab", b"c"), hash_leaf(b"a", b"bc"));
        assert_ne!(hash_leaf(b"k", b"v"), hash_leaf(b"kv", b""));
    }

    #[test]
    fn test_public_key_hex() {
        let pk = PublicKey::from_hex("0a0B").unwrap();
        assert_eq!(pk.as_bytes(), &[0x0a, 0x0b]);
        assert_eq!(pk.to_hex_upper(), "0A0B");
        assert_eq!(pk.to_string(), "0a0b");

        assert!(PublicKey::from_hex("zz").is_err());
        assert!(PublicKey::from_hex("").is_err());
    }

    #[test]
    fn test_ed25519_verify() {
        let sk = SigningKey::from_bytes(&[7u8; 32]);
        let pk = PublicKey::from_bytes(sk.verifying_key().to_bytes().to_vec());
        let sig = Sig::from_bytes(sk.sign(b"payload").to_bytes().to_vec());

        let verifier = Ed25519Verifier;
        assert!(verifier.verify(&pk, b"payload", &sig).is_ok());
        assert!(verifier.verify(&pk, b"tampered", &sig).is_err());
    }

    #[test]
    fn test_ed25519_rejects_malformed() {
        let verifier = Ed25519Verifier;
        let short_key = PublicKey::from_bytes(vec![1, 2, 3]);
        assert!(verifier
            .verify(&short_key, b"m", &Sig::from_bytes(vec![0u8; 64]))
            .is_err());

        let sk = SigningKey::from_bytes(&[9u8; 32]);
        let pk = PublicKey::from_bytes(sk.verifying_key().to_bytes().to_vec());
        assert!(verifier.verify(&pk, b"m", &Sig::from_bytes(vec![1u8; 3])).is_err());
    }
}
