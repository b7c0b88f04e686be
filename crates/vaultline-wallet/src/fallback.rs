//! Deterministic address fallback.
//!
//! When the vault or network is unavailable, a wallet still needs a usable
//! address. This derives one purely from the wallet id; it is not
//! vault-verified and callers tag such wallets with a "generated" flag.

use sha2::{Digest, Sha256};

/// Derive a deterministic pseudo-address from a wallet id.
pub fn deterministic_address(wallet_id: &str) -> String {
    let digest = Sha256::digest(wallet_id.as_bytes());
    format!("rms1{}", &hex::encode(digest)[..56])
}
