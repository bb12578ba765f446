//! Property tests for admission and execution.

use kestrel_chain::{Application, ChainConfig};
use kestrel_core::{make_validator_change_tx, PublicKey, ResponseCode, ValidatorRecord};
use kestrel_storage::MemoryStore;
use proptest::prelude::*;

fn app_with_history() -> Application<MemoryStore> {
    let mut app = Application::new(MemoryStore::default(), ChainConfig::default());
    app.init_chain(&[ValidatorRecord::new(PublicKey::from_bytes(vec![1u8; 32]), 10)])
        .unwrap();
    app.begin_block().unwrap();
    app.deliver_tx(b"seed=1").unwrap();
    app.end_block().unwrap();
    app.commit().unwrap();
    app
}

/// Transactions of every shape: writes, account and validator bodies,
/// JSON-looking envelopes, and noise.
fn arb_tx() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        ("[a-z]{1,8}", "[a-z0-9=]{0,8}").prop_map(|(k, v)| format!("{k}={v}").into_bytes()),
        ("[0-9A-F]{0,70}", "[0-9a-z]{0,4}").prop_map(|(k, p)| format!("val:{k}/{p}").into_bytes()),
        ("[0-9A-F]{0,70}", "[0-9a-z]{0,4}").prop_map(|(k, p)| format!("acc:{k}/{p}").into_bytes()),
        "\\{[ -~]{0,40}".prop_map(String::into_bytes),
        prop::collection::vec(any::<u8>(), 0..64),
    ]
}

// ============================================================================
// Admission is read-only
// ============================================================================

proptest! {
    #[test]
    fn prop_check_tx_does_not_mutate(txs in prop::collection::vec(arb_tx(), 1..20)) {
        let mut app = app_with_history();
        let info_before = app.info();

        app.begin_block().unwrap();
        app.deliver_tx(b"during=block").unwrap();
        let working_before = app.working_root();

        for tx in &txs {
            let _ = app.check_tx(tx);
        }

        prop_assert_eq!(app.working_root(), working_before);
        prop_assert_eq!(app.info(), info_before.clone());

        let end = app.end_block().unwrap();
        prop_assert!(end.validator_updates.is_empty());
        let commit = app.commit().unwrap();

        // Same block without the admission checks.
        let mut control = app_with_history();
        control.begin_block().unwrap();
        control.deliver_tx(b"during=block").unwrap();
        control.end_block().unwrap();
        prop_assert_eq!(control.commit().unwrap().root, commit.root);
    }

    #[test]
    fn prop_check_tx_is_repeatable(tx in arb_tx()) {
        let app = app_with_history();
        prop_assert_eq!(app.check_tx(&tx), app.check_tx(&tx));
    }
}

// ============================================================================
// Execution
// ============================================================================

proptest! {
    #[test]
    fn prop_failed_tx_leaves_root_unchanged(txs in prop::collection::vec(arb_tx(), 1..20)) {
        let mut app = app_with_history();
        app.begin_block().unwrap();

        for tx in &txs {
            let before = app.working_root();
            let resp = app.deliver_tx(tx).unwrap();
            if !resp.is_ok() {
                prop_assert_eq!(app.working_root(), before);
            }
        }
    }

    #[test]
    fn prop_replay_is_deterministic(txs in prop::collection::vec(arb_tx(), 0..20)) {
        let run = |txs: &[Vec<u8>]| {
            let mut app = app_with_history();
            app.begin_block().unwrap();
            let codes: Vec<ResponseCode> =
                txs.iter().map(|tx| app.deliver_tx(tx).unwrap().code).collect();
            let end = app.end_block().unwrap();
            (codes, end, app.commit().unwrap())
        };
        prop_assert_eq!(run(&txs), run(&txs));
    }

    #[test]
    fn prop_validator_updates_follow_delivery_order(powers in prop::collection::vec(1u64..1000, 1..10)) {
        let mut app = app_with_history();
        app.begin_block().unwrap();

        let mut expected = Vec::new();
        for (i, power) in powers.iter().enumerate() {
            let pk = PublicKey::from_bytes(vec![i as u8 + 10; 32]);
            let resp = app.deliver_tx(&make_validator_change_tx(&pk, *power)).unwrap();
            prop_assert!(resp.is_ok());
            expected.push(ValidatorRecord::new(pk, *power));
        }

        prop_assert_eq!(app.end_block().unwrap().validator_updates, expected.clone());
        app.commit().unwrap();

        let listed = app.validators().unwrap();
        for record in &expected {
            prop_assert!(listed.contains(record));
        }
    }
}
