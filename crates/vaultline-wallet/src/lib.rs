//! Wallet operation coordination.
//!
//! Serializes all access to the per-wallet encrypted secret vault through a
//! single global FIFO queue, caches runtime handles with eviction on
//! lock/timeout failures, and exposes the domain-level `WalletService`
//! (create, address, balance, transfer, faucet, sync, delete, reset) with
//! structured error classification and offline degradation.

pub mod coordinator;
pub mod error;
pub mod fallback;
pub mod faucet;
pub mod service;

pub use coordinator::{CoordinatorConfig, WalletCoordinator};
pub use error::ServiceError;
pub use fallback::deterministic_address;
pub use faucet::{FaucetApi, FaucetGrant, HttpFaucet};
pub use service::{
    CreatedWallet, FaucetOutcome, ServiceConfig, SyncedWallet, TransferResult, WalletMeta,
    WalletService,
};
