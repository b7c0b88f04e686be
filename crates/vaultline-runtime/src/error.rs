//! Runtime error types.
//!
//! The closed set of failure classes the adapter can surface. Classification
//! happens here, at the boundary wrapping the vault's native errors, so
//! callers never re-derive error categories from message text.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("wallet {wallet_id} is locked by another operation (lock age {age_ms}ms)")]
    LockHeld { wallet_id: String, age_ms: u64 },

    #[error("secret snapshot not found: {path}")]
    SnapshotMissing { path: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("{what} timed out after {secs} seconds")]
    Timeout { what: String, secs: u64 },

    #[error("insufficient balance: need {need}, have {have}")]
    InsufficientBalance { need: u64, have: u64 },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("no account with alias {0}")]
    AccountNotFound(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl RuntimeError {
    /// Whether this failure indicates lock contention on the vault's
    /// on-disk state. The coordinator evicts cached handles on these.
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, Self::LockHeld { .. })
    }

    /// Whether this failure is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
