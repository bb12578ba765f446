//! Property-based tests for core types.
//!
//! Uses proptest to verify invariants hold for arbitrary inputs.

use std::collections::BTreeMap;

use proptest::prelude::*;

use crate::crypto::{hash_leaf, Hash, PublicKey, Sig};
use crate::keys::{Namespace, StateKey};
use crate::merkle::compute_state_root;
use crate::records::ValidatorRecord;
use crate::tx::{make_signed_tx, make_validator_change_tx, Transaction, TxKind};

// ============================================================================
// Strategies
// ============================================================================

fn arb_bytes32() -> impl Strategy<Value = [u8; 32]> {
    prop::array::uniform32(any::<u8>())
}

fn arb_pubkey() -> impl Strategy<Value = PublicKey> {
    prop::collection::vec(any::<u8>(), 1..48).prop_map(PublicKey::from_bytes)
}

/// Keys that are legal for a key/value write.
fn arb_user_key() -> impl Strategy<Value = String> {
    "[a-z0-9_]{1,16}".prop_filter("reserved prefix", |k| {
        !k.starts_with("acc:") && !k.starts_with("val:")
    })
}

fn arb_state() -> impl Strategy<Value = BTreeMap<Vec<u8>, Vec<u8>>> {
    prop::collection::btree_map(
        prop::collection::vec(any::<u8>(), 1..16),
        prop::collection::vec(any::<u8>(), 0..32),
        0..40,
    )
}

fn root_of(state: &BTreeMap<Vec<u8>, Vec<u8>>) -> Hash {
    compute_state_root(state.iter().map(|(k, v)| (k.as_slice(), v.as_slice())))
}

// ============================================================================
// Property Tests: Hash
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Hash hex roundtrip: from_hex(h.to_hex()) == h
    #[test]
    fn prop_hash_hex_roundtrip(bytes in arb_bytes32()) {
        let h = Hash::from_bytes(bytes);
        let restored = Hash::from_hex(&h.to_hex()).expect("hex roundtrip should succeed");
        prop_assert_eq!(h, restored);
    }

    /// Hash avalanche: different inputs produce different outputs
    #[test]
    fn prop_hash_avalanche(data in prop::collection::vec(any::<u8>(), 1..100)) {
        let mut modified = data.clone();
        modified[0] = modified[0].wrapping_add(1);
        prop_assert_ne!(hash_leaf(b"k", &data), hash_leaf(b"k", &modified));
    }
}

// ============================================================================
// Property Tests: Transaction codec
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Parsing never panics and is deterministic.
    #[test]
    fn prop_parse_total_and_pure(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let a = Transaction::parse(&bytes);
        let b = Transaction::parse(&bytes);
        prop_assert_eq!(a, b);
    }

    /// Validator change payloads decode back to the record they were built from.
    #[test]
    fn prop_validator_change_payload(pk in arb_pubkey(), power in any::<u64>()) {
        let tx = Transaction::parse(&make_validator_change_tx(&pk, power));
        prop_assert_eq!(tx.kind(), TxKind::ValidatorChange);
        let record = tx.to_validator().expect("well-formed payload");
        prop_assert_eq!(record, ValidatorRecord::new(pk, power));
    }

    /// Key/value writes keep everything after the first '=' as the value.
    #[test]
    fn prop_kv_write_split(key in arb_user_key(), value in "[ -~]{0,32}") {
        let payload = format!("{key}={value}");
        let kv = Transaction::parse(payload.as_bytes()).to_kv_write().expect("legal write");
        prop_assert_eq!(kv.key.encode(), key.into_bytes());
        prop_assert_eq!(kv.value, value.into_bytes());
    }

    /// Wrapping a payload in an envelope does not change its classification.
    #[test]
    fn prop_envelope_preserves_kind(
        payload in "[ -~]{0,40}",
        signer in arb_pubkey(),
        sig in prop::collection::vec(any::<u8>(), 1..64),
    ) {
        let raw = Transaction::parse(payload.as_bytes());
        let bytes = make_signed_tx(payload.as_bytes(), &signer, &Sig::from_bytes(sig))
            .expect("utf-8 payload");
        let wrapped = Transaction::parse(&bytes);
        prop_assert_eq!(wrapped.kind(), raw.kind());
        prop_assert_eq!(wrapped.payload(), raw.payload());
        prop_assert_eq!(wrapped.signer(), Some(&signer));
    }
}

// ============================================================================
// Property Tests: Keys and records
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Typed keys never land in another namespace.
    #[test]
    fn prop_key_namespaces(pk in arb_pubkey(), raw in prop::collection::vec(any::<u8>(), 1..32)) {
        prop_assert_eq!(Namespace::of(&StateKey::account(&pk).encode()), Namespace::Account);
        prop_assert_eq!(Namespace::of(&StateKey::validator(&pk).encode()), Namespace::Validator);
        if let Ok(user) = StateKey::user(raw) {
            prop_assert_eq!(Namespace::of(&user.encode()), Namespace::User);
        }
    }

    /// Validator records round-trip through the canonical encoding.
    #[test]
    fn prop_validator_record_roundtrip(pk in arb_pubkey(), power in any::<u64>()) {
        let record = ValidatorRecord::new(pk, power);
        let bytes = record.encode().expect("encode");
        prop_assert_eq!(ValidatorRecord::decode(&bytes).expect("decode"), record);
    }
}

// ============================================================================
// Property Tests: State root
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The root depends only on contents, not on insertion order.
    #[test]
    fn prop_root_order_independent(state in arb_state()) {
        let mut reversed = BTreeMap::new();
        for (k, v) in state.iter().rev() {
            reversed.insert(k.clone(), v.clone());
        }
        prop_assert_eq!(root_of(&state), root_of(&reversed));
    }

    /// Adding an entry always changes the root.
    #[test]
    fn prop_root_sensitive_to_insert(state in arb_state(), key in prop::collection::vec(any::<u8>(), 1..16)) {
        prop_assume!(!state.contains_key(&key));
        let mut grown = state.clone();
        grown.insert(key, b"x".to_vec());
        prop_assert_ne!(root_of(&state), root_of(&grown));
    }

    /// Single-entry states hash to their leaf.
    #[test]
    fn prop_single_entry_root(key in prop::collection::vec(any::<u8>(), 1..16), value in prop::collection::vec(any::<u8>(), 0..16)) {
        let state = BTreeMap::from([(key.clone(), value.clone())]);
        prop_assert_eq!(root_of(&state), hash_leaf(&key, &value));
    }
}
