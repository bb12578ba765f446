//! The application: block lifecycle and the request surface.
//!
//! ```text
//! Uninitialized --InitChain--> Initialized --BeginBlock--> BlockOpen
//!                                                 ^            | CheckTx / DeliverTx
//!                                                 |            v
//!                          Committed <--Commit-- BlockClosing <--EndBlock
//!                              |
//!                              +--BeginBlock--> BlockOpen ...
//! ```
//!
//! Calls outside their phase are contract violations and return
//! [`FatalError`]. Per-transaction failures never are.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use kestrel_core::{
    Account, Ed25519Verifier, Hash, ResponseCode, SignatureVerifier, Transaction, ValidatorRecord,
};
use kestrel_storage::{StateSnapshot, StateStore};

use crate::admission::AdmissionChecker;
use crate::error::{FatalError, TxError};
use crate::executor;
use crate::validators::{
    enumerate, enumerate_accounts, resolve, GenesisAuthorization, PendingValidatorUpdates,
};

/// Query path for a point lookup.
pub const QUERY_DB_GET: &str = "DbGet";

/// Chain configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Chain identifier, reported in logs.
    pub chain_id: String,
    /// Whether CheckTx verifies envelope signatures.
    pub verify_signatures: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: "kestrel-local".into(),
            verify_signatures: true,
        }
    }
}

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initialized,
    BlockOpen,
    BlockClosing,
    Committed,
}

/// Response to `Info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoResponse {
    /// `{"size":N}`
    pub data: String,
    pub size: u64,
    pub last_block_height: u64,
    pub last_block_app_hash: Hash,
}

/// Response to `CheckTx` and `DeliverTx`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResponse {
    pub code: ResponseCode,
    pub log: String,
}

impl TxResponse {
    pub fn ok() -> Self {
        Self {
            code: ResponseCode::Ok,
            log: String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

impl From<TxError> for TxResponse {
    fn from(err: TxError) -> Self {
        Self {
            code: err.code(),
            log: err.to_string(),
        }
    }
}

/// A `Query` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRequest {
    pub path: String,
    /// JSON body, `{"key": "..."}` for [`QUERY_DB_GET`].
    pub data: Vec<u8>,
    /// Version to read; 0 means the latest.
    pub height: u64,
}

impl QueryRequest {
    /// A `DbGet` lookup of `key` at the latest version.
    pub fn db_get(key: &str) -> Self {
        Self {
            path: QUERY_DB_GET.into(),
            data: serde_json::json!({ "key": key }).to_string().into_bytes(),
            height: 0,
        }
    }

    /// Read at a specific version instead of the latest.
    pub fn at_height(mut self, height: u64) -> Self {
        self.height = height;
        self
    }
}

/// Body of a `DbGet` query.
#[derive(Debug, Deserialize)]
struct DbGetBody {
    key: String,
}

/// Response to `Query`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    pub code: ResponseCode,
    pub log: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Position of the key in sorted order at the answered version.
    pub index: u64,
    /// The version that answered.
    pub height: u64,
}

impl QueryResponse {
    fn failure(code: ResponseCode, log: impl Into<String>) -> Self {
        Self {
            code,
            log: log.into(),
            key: Vec::new(),
            value: Vec::new(),
            index: 0,
            height: 0,
        }
    }
}

/// Response to `EndBlock`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndBlockResponse {
    pub validator_updates: Vec<ValidatorRecord>,
}

/// Response to `Commit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResponse {
    pub code: ResponseCode,
    pub height: u64,
    pub root: Hash,
}

/// A read-only handle for running CheckTx off the block thread.
///
/// Holds the committed version it was taken from; later commits do not
/// affect it.
#[derive(Debug, Clone)]
pub struct AdmissionView {
    snapshot: StateSnapshot,
    genesis: Arc<GenesisAuthorization>,
    checker: AdmissionChecker,
}

impl AdmissionView {
    /// Run admission against the held version.
    pub fn check_tx(&self, bytes: &[u8]) -> TxResponse {
        check_against(&self.checker, bytes, &self.snapshot, &self.genesis)
    }

    /// The version this view reads.
    pub fn height(&self) -> u64 {
        self.snapshot.version()
    }
}

fn check_against(
    checker: &AdmissionChecker,
    bytes: &[u8],
    snapshot: &StateSnapshot,
    genesis: &GenesisAuthorization,
) -> TxResponse {
    let tx = Transaction::parse(bytes);
    match checker.check(&tx, snapshot, genesis) {
        Ok(()) => TxResponse::ok(),
        Err(err) => {
            if err.is_internal() {
                error!(height = snapshot.version(), "admission failed: {}", err);
            }
            err.into()
        }
    }
}

/// The replicated state machine.
pub struct Application<S: StateStore> {
    store: S,
    phase: Phase,
    /// Frozen after InitChain; shared with admission views.
    genesis: Arc<GenesisAuthorization>,
    pending: PendingValidatorUpdates,
    admission: AdmissionChecker,
    config: ChainConfig,
}

impl<S: StateStore> Application<S> {
    /// Create an application over `store`, verifying signatures with Ed25519.
    ///
    /// A store that already holds committed versions resumes in the
    /// Initialized phase.
    pub fn new(store: S, config: ChainConfig) -> Self {
        Self::with_verifier(store, config, Arc::new(Ed25519Verifier))
    }

    /// Create an application with a custom signature verifier.
    pub fn with_verifier(store: S, config: ChainConfig, verifier: Arc<dyn SignatureVerifier>) -> Self {
        let admission = if config.verify_signatures {
            AdmissionChecker::new(verifier)
        } else {
            AdmissionChecker::without_signatures()
        };

        let latest = store.latest_version();
        let phase = if latest > 0 {
            info!(chain_id = %config.chain_id, height = latest, "resuming from committed state");
            Phase::Initialized
        } else {
            Phase::Uninitialized
        };

        Self {
            store,
            phase,
            genesis: Arc::new(GenesisAuthorization::empty()),
            pending: PendingValidatorUpdates::new(),
            admission,
            config,
        }
    }

    /// Get the current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Get the chain configuration.
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// The frozen genesis authorization table.
    pub fn genesis(&self) -> &GenesisAuthorization {
        &self.genesis
    }

    /// Borrow the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Height of the latest committed version.
    pub fn height(&self) -> u64 {
        self.store.latest_version()
    }

    /// Root fingerprint of the in-progress block.
    pub fn working_root(&self) -> Hash {
        self.store.working_root()
    }

    pub fn info(&self) -> InfoResponse {
        let latest = self.store.latest();
        InfoResponse {
            data: serde_json::json!({ "size": latest.size() }).to_string(),
            size: latest.size() as u64,
            last_block_height: latest.version(),
            last_block_app_hash: latest.root(),
        }
    }

    /// Accepts any option.
    pub fn set_option(&mut self, key: &str, value: &str) -> TxResponse {
        debug!(key, value, "set option");
        TxResponse::ok()
    }

    /// Admission check against the latest committed version.
    pub fn check_tx(&self, bytes: &[u8]) -> TxResponse {
        check_against(&self.admission, bytes, &self.store.latest(), &self.genesis)
    }

    /// A handle for running CheckTx concurrently with block execution.
    pub fn admission_view(&self) -> AdmissionView {
        AdmissionView {
            snapshot: self.store.latest(),
            genesis: Arc::clone(&self.genesis),
            checker: self.admission.clone(),
        }
    }

    /// Execute a transaction in the open block.
    pub fn deliver_tx(&mut self, bytes: &[u8]) -> Result<TxResponse, FatalError> {
        self.require(Phase::BlockOpen, "deliver_tx")?;

        let tx = Transaction::parse(bytes);
        match executor::apply(&tx, &mut self.store, &mut self.pending) {
            Ok(()) => Ok(TxResponse::ok()),
            Err(err) if err.is_internal() => {
                Err(FatalError::storage("deliver_tx", err.to_string()))
            }
            Err(err) => {
                debug!(kind = ?tx.kind(), code = %err.code(), "transaction failed: {}", err);
                Ok(err.into())
            }
        }
    }

    /// Point lookup against a committed version.
    pub fn query(&self, request: &QueryRequest) -> QueryResponse {
        if request.path != QUERY_DB_GET {
            return QueryResponse::failure(ResponseCode::BadRequest, "wrong path");
        }

        let body: DbGetBody = match serde_json::from_slice(&request.data) {
            Ok(body) => body,
            Err(e) => return QueryResponse::failure(ResponseCode::BadNonce, e.to_string()),
        };

        let snapshot = if request.height == 0 {
            self.store.latest()
        } else {
            match self.store.snapshot_at(request.height) {
                Ok(snapshot) => snapshot,
                Err(e) => return QueryResponse::failure(ResponseCode::BadRequest, e.message()),
            }
        };

        let key = body.key.into_bytes();
        let value = snapshot.data().get(&key).cloned();
        QueryResponse {
            code: ResponseCode::Ok,
            log: if value.is_some() { "exists" } else { "does not exist" }.into(),
            index: snapshot.index_of(&key),
            height: snapshot.version(),
            value: value.unwrap_or_default(),
            key,
        }
    }

    /// Register the genesis validators and freeze the authorization table.
    ///
    /// Each accepted validator also gets an account record carrying its
    /// power, so its signed transactions pass the signer check. Entries
    /// that fail to resolve are logged and skipped.
    pub fn init_chain(&mut self, validators: &[ValidatorRecord]) -> Result<(), FatalError> {
        self.require(Phase::Uninitialized, "init_chain")?;

        let mut authorized = GenesisAuthorization::empty();
        for record in validators {
            match self.register_genesis(record) {
                Ok(()) => authorized.insert(record.pub_key.clone(), record.power),
                Err(err) if err.is_internal() => {
                    return Err(FatalError::storage("init_chain", err.to_string()));
                }
                Err(err) => {
                    error!(validator = %record.pub_key, "Error updating validators: {}", err);
                }
            }
        }

        info!(
            chain_id = %self.config.chain_id,
            validators = authorized.len(),
            "initialized chain"
        );
        self.genesis = Arc::new(authorized);
        self.phase = Phase::Initialized;
        Ok(())
    }

    fn register_genesis(&mut self, record: &ValidatorRecord) -> Result<(), TxError> {
        resolve(record, &mut self.store)?;
        if !record.is_removal() {
            let account = Account::new(record.pub_key.clone(), record.power);
            self.store.set(account.key().encode(), account.encode_value())?;
        }
        Ok(())
    }

    /// Rebuild the authorization table after a restart, without touching
    /// state. Only valid once, on a resumed application.
    pub fn restore_authorization(&mut self, validators: &[ValidatorRecord]) -> Result<(), FatalError> {
        if self.phase != Phase::Initialized || !self.genesis.is_empty() {
            return Err(FatalError::lifecycle("restore_authorization", self.phase));
        }
        self.genesis = Arc::new(
            validators
                .iter()
                .map(|r| (r.pub_key.clone(), r.power))
                .collect(),
        );
        info!(validators = self.genesis.len(), "restored genesis authorization");
        Ok(())
    }

    /// Open a block. Clears the pending validator log only.
    pub fn begin_block(&mut self) -> Result<(), FatalError> {
        match self.phase {
            Phase::Initialized | Phase::Committed => {}
            phase => return Err(FatalError::lifecycle("begin_block", phase)),
        }
        self.pending = PendingValidatorUpdates::new();
        self.phase = Phase::BlockOpen;
        debug!(height = self.height() + 1, "begin block");
        Ok(())
    }

    /// Close the block and hand out its validator diff.
    pub fn end_block(&mut self) -> Result<EndBlockResponse, FatalError> {
        self.require(Phase::BlockOpen, "end_block")?;
        self.phase = Phase::BlockClosing;
        Ok(EndBlockResponse {
            validator_updates: self.pending.take(),
        })
    }

    /// Seal the block as the next version.
    pub fn commit(&mut self) -> Result<CommitResponse, FatalError> {
        self.require(Phase::BlockClosing, "commit")?;

        let height = self.height() + 1;
        let snapshot = self
            .store
            .save_version()
            .map_err(|source| FatalError::Commit { height, source })?;
        if snapshot.version() != height {
            return Err(FatalError::Commit {
                height,
                source: kestrel_core::Error::internal(format!(
                    "store sealed version {} instead of {}",
                    snapshot.version(),
                    height
                )),
            });
        }

        self.phase = Phase::Committed;
        info!(height, root = %snapshot.root(), "Commit block");
        Ok(CommitResponse {
            code: ResponseCode::Ok,
            height,
            root: snapshot.root(),
        })
    }

    /// The current validator set, in key order.
    pub fn validators(&self) -> Result<Vec<ValidatorRecord>, FatalError> {
        enumerate(&self.store)
    }

    /// The registered accounts, in key order.
    pub fn accounts(&self) -> Result<Vec<Account>, FatalError> {
        enumerate_accounts(&self.store)
    }

    fn require(&self, expected: Phase, operation: &'static str) -> Result<(), FatalError> {
        if self.phase != expected {
            return Err(FatalError::lifecycle(operation, self.phase));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::{make_validator_change_tx, PublicKey};
    use kestrel_storage::MemoryStore;

    fn pk(byte: u8) -> PublicKey {
        PublicKey::from_bytes(vec![byte; 32])
    }

    fn test_app() -> Application<MemoryStore> {
        Application::new(MemoryStore::default(), ChainConfig::default())
    }

    #[test]
    fn test_initial_phase() {
        let app = test_app();
        assert_eq!(app.phase(), Phase::Uninitialized);
        assert_eq!(app.height(), 0);
        assert_eq!(app.info().data, r#"{"size":0}"#);
    }

    #[test]
    fn test_init_chain_twice_is_fatal() {
        let mut app = test_app();
        app.init_chain(&[ValidatorRecord::new(pk(1), 10)]).unwrap();
        let err = app.init_chain(&[]).unwrap_err();
        assert!(matches!(
            err,
            FatalError::Lifecycle { operation: "init_chain", phase: Phase::Initialized }
        ));
    }

    #[test]
    fn test_init_chain_skips_bad_entries() {
        let mut app = test_app();
        app.init_chain(&[ValidatorRecord::new(pk(1), 10), ValidatorRecord::new(pk(2), 0)])
            .unwrap();

        assert!(app.genesis().is_authorized(&pk(1)));
        assert!(!app.genesis().is_authorized(&pk(2)));
        assert_eq!(app.validators().unwrap(), vec![ValidatorRecord::new(pk(1), 10)]);
    }

    #[test]
    fn test_init_chain_registers_genesis_accounts() {
        let mut app = test_app();
        app.init_chain(&[ValidatorRecord::new(pk(2), 7), ValidatorRecord::new(pk(1), 3)])
            .unwrap();

        assert_eq!(
            app.accounts().unwrap(),
            vec![Account::new(pk(1), 3), Account::new(pk(2), 7)]
        );

        app.begin_block().unwrap();
        app.end_block().unwrap();
        app.commit().unwrap();

        // The records are part of the first committed version.
        let latest = app.store().latest();
        let key = Account::new(pk(2), 7).key().encode();
        assert_eq!(latest.data().get(&key).map(Vec::as_slice), Some(&b"7"[..]));
        assert_eq!(latest.size(), 4);
    }

    #[test]
    fn test_commit_before_init_is_fatal() {
        let mut app = test_app();
        assert!(matches!(
            app.commit().unwrap_err(),
            FatalError::Lifecycle { operation: "commit", .. }
        ));
    }

    #[test]
    fn test_out_of_phase_calls() {
        let mut app = test_app();
        assert!(app.begin_block().is_err());
        assert!(app.deliver_tx(b"k=v").is_err());

        app.init_chain(&[]).unwrap();
        assert!(app.end_block().is_err());
        assert!(app.commit().is_err());

        app.begin_block().unwrap();
        assert!(app.begin_block().is_err());
        assert!(app.commit().is_err());

        app.end_block().unwrap();
        assert!(app.deliver_tx(b"k=v").is_err());
        assert!(app.end_block().is_err());

        app.commit().unwrap();
        assert!(app.commit().is_err());
        assert!(app.end_block().is_err());
    }

    #[test]
    fn test_block_cycle() {
        let mut app = test_app();
        app.init_chain(&[ValidatorRecord::new(pk(1), 10)]).unwrap();

        for expected in 1..=3 {
            app.begin_block().unwrap();
            let resp = app.deliver_tx(format!("k{expected}=v").as_bytes()).unwrap();
            assert!(resp.is_ok());
            app.end_block().unwrap();
            let commit = app.commit().unwrap();
            assert_eq!(commit.height, expected);
            assert_eq!(commit.root, app.info().last_block_app_hash);
        }
        assert_eq!(app.phase(), Phase::Committed);
    }

    #[test]
    fn test_end_block_emits_updates_in_order() {
        let mut app = test_app();
        app.init_chain(&[ValidatorRecord::new(pk(1), 10)]).unwrap();
        app.begin_block().unwrap();

        app.deliver_tx(&make_validator_change_tx(&pk(2), 4)).unwrap();
        app.deliver_tx(&make_validator_change_tx(&pk(1), 0)).unwrap();
        let failed = app.deliver_tx(&make_validator_change_tx(&pk(3), 0)).unwrap();
        assert_eq!(failed.code, ResponseCode::Unauthorized);

        let end = app.end_block().unwrap();
        assert_eq!(
            end.validator_updates,
            vec![ValidatorRecord::new(pk(2), 4), ValidatorRecord::new(pk(1), 0)]
        );
    }

    #[test]
    fn test_query_paths() {
        let mut app = test_app();
        app.init_chain(&[]).unwrap();
        app.begin_block().unwrap();
        app.deliver_tx(b"b=2").unwrap();
        app.end_block().unwrap();
        app.commit().unwrap();

        let hit = app.query(&QueryRequest::db_get("b"));
        assert_eq!(hit.code, ResponseCode::Ok);
        assert_eq!(hit.log, "exists");
        assert_eq!(hit.value, b"2");
        assert_eq!(hit.height, 1);

        let wrong = app.query(&QueryRequest {
            path: "Other".into(),
            ..QueryRequest::default()
        });
        assert_eq!(wrong.code, ResponseCode::BadRequest);
        assert_eq!(wrong.log, "wrong path");

        let malformed = app.query(&QueryRequest {
            path: QUERY_DB_GET.into(),
            data: b"not json".to_vec(),
            height: 0,
        });
        assert_eq!(malformed.code, ResponseCode::BadNonce);

        let missing = app.query(&QueryRequest::db_get("b").at_height(7));
        assert_eq!(missing.code, ResponseCode::BadRequest);
    }

    #[test]
    fn test_set_option_is_ok() {
        let mut app = test_app();
        assert!(app.set_option("serial", "on").is_ok());
    }
}
