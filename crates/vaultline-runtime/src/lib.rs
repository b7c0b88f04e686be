//! Vault runtime adapter.
//!
//! Wraps the single-writer encrypted secret vault and its ledger account in
//! a small async API: sealed snapshot files, advisory file locks with a
//! staleness policy, a node client, and the `VaultRuntime` trait the
//! coordinator drives. All native vault failures are classified here, once,
//! into the tagged `RuntimeError` set.

pub mod error;
pub mod lock;
pub mod node;
pub mod runtime;
pub mod snapshot;

pub use error::RuntimeError;
pub use lock::FileLock;
pub use node::{BaseCoinBalance, NodeClient};
pub use runtime::{
    Balance, RuntimeConfig, RuntimeProvider, StrongboxProvider, StrongboxRuntime,
    TransferOutput, TransferReceipt, VaultRuntime,
};
pub use snapshot::SecretSnapshot;
