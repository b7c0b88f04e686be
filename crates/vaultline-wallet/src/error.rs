//! Service error taxonomy.
//!
//! The structured error set surfaced to the calling layer. Classification
//! from runtime errors happens exactly once, in `From<RuntimeError>`; the
//! `kind()` tag is all the calling layer needs to pick status codes and
//! recovery hints.

use thiserror::Error;
use vaultline_runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("insufficient funds: need {need}, have {have}")]
    InsufficientFunds { need: u64, have: u64 },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("account manager error: {message}")]
    AccountManager { message: String },

    #[error("lock contention: {message}")]
    LockContention { message: String },

    #[error("operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("vault missing: {message}")]
    VaultMissing { message: String },

    #[error("transfer error: {message}")]
    Transfer { message: String },
}

impl ServiceError {
    /// Stable wire tag for the calling layer.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validationError",
            Self::InsufficientFunds { .. } => "insufficientFunds",
            Self::Network { .. } => "networkError",
            Self::AccountManager { .. } => "accountManagerError",
            Self::LockContention { .. } => "lockContention",
            Self::Timeout { .. } => "timeout",
            Self::VaultMissing { .. } => "vaultMissing",
            Self::Transfer { .. } => "transferError",
        }
    }

    /// Whether the coordinator should evict the wallet's cached handle.
    pub fn is_lock_or_timeout(&self) -> bool {
        matches!(self, Self::LockContention { .. } | Self::Timeout { .. })
    }

    /// Whether a failed queued transfer is worth retrying via the direct
    /// path (transient infrastructure trouble, not a caller mistake).
    pub fn is_retryable_via_direct(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::Timeout { .. }
                | Self::LockContention { .. }
                | Self::AccountManager { .. }
        )
    }

    /// Structured `{type, error, details}` shape for the calling layer.
    pub fn to_structured(&self) -> serde_json::Value {
        let details = match self {
            Self::InsufficientFunds { need, have } => {
                serde_json::json!({ "need": need, "have": have })
            }
            Self::Timeout { seconds } => serde_json::json!({ "seconds": seconds }),
            _ => serde_json::Value::Null,
        };
        serde_json::json!({
            "type": self.kind(),
            "error": self.to_string(),
            "details": details,
        })
    }
}

impl From<RuntimeError> for ServiceError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::LockHeld { .. } => Self::LockContention { message: e.to_string() },
            RuntimeError::Timeout { secs, .. } => Self::Timeout { seconds: secs },
            RuntimeError::SnapshotMissing { .. } => Self::VaultMissing { message: e.to_string() },
            RuntimeError::InsufficientBalance { need, have } => {
                Self::InsufficientFunds { need, have }
            }
            RuntimeError::Network(message) => Self::Network { message },
            RuntimeError::InvalidAddress(message) => Self::Validation(message),
            RuntimeError::AccountNotFound(_)
            | RuntimeError::Crypto(_)
            | RuntimeError::Storage(_)
            | RuntimeError::Io(_)
            | RuntimeError::Other(_) => Self::AccountManager { message: e.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        let e = ServiceError::InsufficientFunds { need: 10, have: 3 };
        assert_eq!(e.kind(), "insufficientFunds");
        assert_eq!(ServiceError::Timeout { seconds: 120 }.kind(), "timeout");
    }

    #[test]
    fn test_classification_from_runtime() {
        let e: ServiceError = RuntimeError::LockHeld { wallet_id: "w".into(), age_ms: 12 }.into();
        assert!(e.is_lock_or_timeout());

        let e: ServiceError = RuntimeError::SnapshotMissing { path: "p".into() }.into();
        assert_eq!(e.kind(), "vaultMissing");

        let e: ServiceError = RuntimeError::InsufficientBalance { need: 5, have: 1 }.into();
        assert_eq!(e.kind(), "insufficientFunds");
    }

    #[test]
    fn test_structured_shape() {
        let v = ServiceError::InsufficientFunds { need: 10, have: 3 }.to_structured();
        assert_eq!(v["type"], "insufficientFunds");
        assert_eq!(v["details"]["need"], 10);
        assert!(v["error"].as_str().is_some());
    }
}
