//! Deterministic state machine for the Kestrel chain.
//!
//! This crate sits behind a replication engine that delivers an agreed,
//! ordered stream of blocks. It provides:
//! - Admission checks (read-only CheckTx)
//! - Transaction execution (DeliverTx)
//! - Validator-set management (genesis authorization, per-block diff)
//! - The block lifecycle and request surface ([`Application`])
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Application                         │
//! │  (Phases, InitChain/BeginBlock/EndBlock/Commit, Query)  │
//! └─────────────────────────────────────────────────────────┘
//!              │                              │
//!              ▼                              ▼
//! ┌────────────────────────┐    ┌──────────────────────────┐
//! │    AdmissionChecker    │    │        Executor          │
//! │ (committed snapshot,   │    │ (working view, pending   │
//! │  read-only)            │    │  validator updates)      │
//! └────────────────────────┘    └──────────────────────────┘
//!              │                              │
//!              ▼                              ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                 ValidatorSetManager                     │
//! │  (Genesis authorization, resolve, enumerate)            │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   kestrel-storage                       │
//! │  (Working set over the latest committed version)        │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod admission;
mod app;
mod error;
pub mod executor;
mod validators;

pub use admission::AdmissionChecker;
pub use app::{
    AdmissionView, Application, ChainConfig, CommitResponse, EndBlockResponse, InfoResponse, Phase,
    QueryRequest, QueryResponse, TxResponse, QUERY_DB_GET,
};
pub use error::{FatalError, TxError};
pub use validators::{
    enumerate, enumerate_accounts, resolve, GenesisAuthorization, PendingValidatorUpdates,
};
