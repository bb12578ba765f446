//! Per-transaction failures and fatal errors.
//!
//! [`TxError`] is recoverable: the transaction is rejected with a response
//! code and the block continues. [`FatalError`] is not: the hosting process
//! logs it and exits.

use kestrel_core::{ErrorCode, ResponseCode};

use crate::app::Phase;

/// A rejected or failed transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxError {
    #[error("{0}")]
    Encoding(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadNonce(String),

    /// A server-side failure. Escalated to [`FatalError`] during execution.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TxError {
    pub fn encoding(message: impl Into<String>) -> Self {
        TxError::Encoding(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        TxError::Unauthorized(message.into())
    }

    /// The response code reported for this failure.
    pub fn code(&self) -> ResponseCode {
        match self {
            TxError::Encoding(_) | TxError::Internal(_) => ResponseCode::EncodingError,
            TxError::Unauthorized(_) => ResponseCode::Unauthorized,
            TxError::BadNonce(_) => ResponseCode::BadNonce,
        }
    }

    /// Check if this failure must stop the process.
    pub fn is_internal(&self) -> bool {
        matches!(self, TxError::Internal(_))
    }
}

impl From<kestrel_core::Error> for TxError {
    fn from(err: kestrel_core::Error) -> Self {
        match err.code() {
            ErrorCode::Unauthorized | ErrorCode::InvalidSignature => {
                TxError::Unauthorized(err.message())
            }
            code if code.is_client_error() => TxError::Encoding(err.message()),
            _ => TxError::Internal(err.to_string()),
        }
    }
}

/// An unrecoverable invariant violation.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    /// A lifecycle call arrived in a phase that does not allow it.
    #[error("{operation} is not allowed in phase {phase:?}")]
    Lifecycle {
        operation: &'static str,
        phase: Phase,
    },

    /// Sealing a new version failed.
    #[error("commit failed at height {height}: {source}")]
    Commit {
        height: u64,
        #[source]
        source: kestrel_core::Error,
    },

    /// A stored validator record does not decode.
    #[error("corrupt validator record under key {key}: {source}")]
    CorruptValidator {
        key: String,
        #[source]
        source: kestrel_core::Error,
    },

    /// A stored account power does not decode.
    #[error("corrupt account record under key {key}: {source}")]
    CorruptAccount {
        key: String,
        #[source]
        source: kestrel_core::Error,
    },

    /// The store failed underneath a lifecycle operation.
    #[error("storage failure during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },
}

impl FatalError {
    pub(crate) fn lifecycle(operation: &'static str, phase: Phase) -> Self {
        FatalError::Lifecycle { operation, phase }
    }

    pub(crate) fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        FatalError::Storage {
            operation,
            message: message.into(),
        }
    }
}
