//! Error types for Kestrel.
//!
//! Provides structured errors with:
//! - Unique error codes for diagnostics
//! - Source error chaining
//! - Client vs server error categorization
//!
//! These are internal errors. The code space reported to the replication
//! engine lives in [`ResponseCode`].

use std::io;
use thiserror::Error;

/// Result type for Kestrel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error codes for internal diagnostics.
///
/// Codes are structured as:
/// - 1xxx: Validation errors (client)
/// - 2xxx: Not found errors (client)
/// - 4xxx: Authorization (client)
/// - 5xxx: Storage errors (server)
/// - 6xxx: Internal errors (server)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Validation errors (1xxx)
    InvalidHash = 1001,
    InvalidKey = 1002,
    InvalidSignature = 1003,
    InvalidPayload = 1004,
    InvalidFormat = 1005,

    // Not found errors (2xxx)
    VersionNotFound = 2002,

    // Auth errors (4xxx)
    Unauthorized = 4001,

    // Storage errors (5xxx)
    StorageRead = 5001,
    StorageWrite = 5002,
    StorageCorruption = 5003,

    // Internal errors (6xxx)
    Serialization = 6001,
    Deserialization = 6002,
    Internal = 6003,
}

impl ErrorCode {
    /// Get the numeric code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Check if this is a client error.
    pub fn is_client_error(self) -> bool {
        (1000..5000).contains(&self.code())
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

/// Errors that can occur in Kestrel.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Validation Errors (client errors)
    // ========================================================================
    /// Invalid hash format or value.
    #[error("[{code}] invalid hash: {message}")]
    InvalidHash {
        code: ErrorCode,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid public key.
    #[error("[{code}] invalid key: {message}")]
    InvalidKey { code: ErrorCode, message: String },

    /// Signature verification failed.
    #[error("[{code}] signature verification failed")]
    InvalidSignature { code: ErrorCode },

    /// Transaction payload does not decode.
    #[error("[{code}] invalid payload: {message}")]
    InvalidPayload { code: ErrorCode, message: String },

    // ========================================================================
    // Not Found Errors (client errors)
    // ========================================================================
    /// Item not found.
    #[error("[{code}] not found: {message}")]
    NotFound { code: ErrorCode, message: String },

    // ========================================================================
    // Authorization Errors (client errors)
    // ========================================================================
    /// Caller is not allowed to perform the operation.
    #[error("[{code}] unauthorized: {message}")]
    Unauthorized { code: ErrorCode, message: String },

    // ========================================================================
    // Storage Errors (server errors)
    // ========================================================================
    /// Storage operation failed.
    #[error("[{code}] storage error: {message}")]
    Storage {
        code: ErrorCode,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ========================================================================
    // Serialization Errors (server errors)
    // ========================================================================
    /// Serialization/deserialization failed.
    #[error("[{code}] serialization error: {message}")]
    Serialization {
        code: ErrorCode,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ========================================================================
    // Internal Errors (server errors)
    // ========================================================================
    /// Internal error.
    #[error("[{code}] internal error: {message}")]
    Internal { code: ErrorCode, message: String },
}

impl Error {
    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidHash { code, .. } => *code,
            Error::InvalidKey { code, .. } => *code,
            Error::InvalidSignature { code } => *code,
            Error::InvalidPayload { code, .. } => *code,
            Error::NotFound { code, .. } => *code,
            Error::Unauthorized { code, .. } => *code,
            Error::Storage { code, .. } => *code,
            Error::Serialization { code, .. } => *code,
            Error::Internal { code, .. } => *code,
        }
    }

    /// The message without the code prefix, for user-visible logs.
    pub fn message(&self) -> String {
        match self {
            Error::InvalidHash { message, .. }
            | Error::InvalidKey { message, .. }
            | Error::InvalidPayload { message, .. }
            | Error::NotFound { message, .. }
            | Error::Unauthorized { message, .. }
            | Error::Storage { message, .. }
            | Error::Serialization { message, .. }
            | Error::Internal { message, .. } => message.clone(),
            Error::InvalidSignature { .. } => "signature verification failed".to_string(),
        }
    }
}

// ============================================================================
// Convenience constructors
// ============================================================================

impl Error {
    /// Create an InvalidHash error.
    pub fn invalid_hash(message: impl Into<String>) -> Self {
        Error::InvalidHash {
            code: ErrorCode::InvalidHash,
            message: message.into(),
            source: None,
        }
    }

    /// Create an InvalidKey error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Error::InvalidKey {
            code: ErrorCode::InvalidKey,
            message: message.into(),
        }
    }

    /// Create an InvalidSignature error.
    pub fn invalid_signature() -> Self {
        Error::InvalidSignature {
            code: ErrorCode::InvalidSignature,
        }
    }

    /// Create an InvalidPayload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Error::InvalidPayload {
            code: ErrorCode::InvalidPayload,
            message: message.into(),
        }
    }

    /// Create a NotFound error for a missing or pruned version.
    pub fn version_not_found(version: u64) -> Self {
        Error::NotFound {
            code: ErrorCode::VersionNotFound,
            message: format!("version {version} is not available"),
        }
    }

    /// Create an Unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Error::Unauthorized {
            code: ErrorCode::Unauthorized,
            message: message.into(),
        }
    }

    /// Create a Storage error for a failed read.
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            code: ErrorCode::StorageRead,
            message: message.into(),
            source: None,
        }
    }

    /// Create a Storage error for a failed write.
    pub fn storage_write(message: impl Into<String>) -> Self {
        Error::Storage {
            code: ErrorCode::StorageWrite,
            message: message.into(),
            source: None,
        }
    }

    /// Create a Storage error for data that no longer decodes.
    pub fn corruption(message: impl Into<String>) -> Self {
        Error::Storage {
            code: ErrorCode::StorageCorruption,
            message: message.into(),
            source: None,
        }
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            code: ErrorCode::Internal,
            message: message.into(),
        }
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization {
            code: ErrorCode::Serialization,
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization {
            code: ErrorCode::Deserialization,
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Storage {
            code: ErrorCode::StorageRead,
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::InvalidHash {
            code: ErrorCode::InvalidHash,
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

// ============================================================================
// Protocol response codes
// ============================================================================

/// Result code reported to the replication engine.
///
/// Numbering follows the conventional command/query protocol layout: zero is
/// success, every non-zero value is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum ResponseCode {
    Ok = 0,
    EncodingError = 1,
    BadNonce = 2,
    Unauthorized = 3,
    BadRequest = 4,
}

impl ResponseCode {
    /// Get the numeric code.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Check if this is the success code.
    pub fn is_ok(self) -> bool {
        self == ResponseCode::Ok
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResponseCode::Ok => "ok",
            ResponseCode::EncodingError => "encoding error",
            ResponseCode::BadNonce => "bad nonce",
            ResponseCode::Unauthorized => "unauthorized",
            ResponseCode::BadRequest => "bad request",
        };
        write!(f, "{name} ({})", self.code())
    }
}
