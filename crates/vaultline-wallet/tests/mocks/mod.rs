//! Shared test doubles: an in-memory vault runtime, a counting provider,
//! and a switchable faucet.

// Each test binary exercises a subset of these doubles.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vaultline_runtime::{
    Balance, RuntimeError, RuntimeProvider, SecretSnapshot, TransferOutput, TransferReceipt,
    VaultRuntime,
};
use vaultline_wallet::faucet::{FaucetApi, FaucetGrant};
use vaultline_wallet::ServiceError;

/// Shared ledger-and-vault state behind every mock handle, so evicting and
/// re-opening a handle preserves balances the way the real vault does.
#[derive(Default)]
pub struct MockState {
    /// Available balance per wallet id, base units.
    pub balances: Mutex<HashMap<String, u64>>,
    /// Every send that reached the ledger: (recipient, amount).
    pub sent: Mutex<Vec<(String, u64)>>,
    /// Stored mnemonics per wallet id.
    pub mnemonics: Mutex<HashMap<String, String>>,
    pub accounts: Mutex<HashSet<String>>,
    /// Wallets with a derived address.
    pub derived: Mutex<HashSet<String>>,
    /// Handle constructions performed by the provider.
    pub constructed: AtomicUsize,
    /// Fail this many upcoming `open` calls before succeeding.
    pub fail_next_opens: AtomicUsize,
    /// Make every sync hang (far past any test timeout).
    pub sync_hangs: AtomicBool,
    /// Make every sync fail fast with a network error.
    pub sync_fails: AtomicBool,
    /// Make every send fail with a network error.
    pub sends_fail: AtomicBool,
}

impl MockState {
    pub fn set_balance(&self, wallet_id: &str, base: u64) {
        self.balances.lock().unwrap().insert(wallet_id.to_string(), base);
    }

    pub fn balance(&self, wallet_id: &str) -> u64 {
        self.balances.lock().unwrap().get(wallet_id).copied().unwrap_or(0)
    }

    pub fn sends(&self) -> Vec<(String, u64)> {
        self.sent.lock().unwrap().clone()
    }
}

pub fn mock_address(wallet_id: &str) -> String {
    format!("rms1mock{}", wallet_id)
}

pub struct MockRuntime {
    wallet_id: String,
    state: Arc<MockState>,
    snapshot_path: PathBuf,
}

#[async_trait]
impl VaultRuntime for MockRuntime {
    async fn store_mnemonic(&self, mnemonic: &str) -> Result<(), RuntimeError> {
        self.state
            .mnemonics
            .lock()
            .unwrap()
            .insert(self.wallet_id.clone(), mnemonic.to_string());
        // Materialize the snapshot file so existence checks behave.
        if let Some(parent) = self.snapshot_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.snapshot_path, b"mock-snapshot")?;
        Ok(())
    }

    async fn create_account(&self, alias: &str) -> Result<(), RuntimeError> {
        self.state.accounts.lock().unwrap().insert(alias.to_string());
        Ok(())
    }

    async fn account_exists(&self, alias: &str) -> Result<bool, RuntimeError> {
        Ok(self.state.accounts.lock().unwrap().contains(alias))
    }

    async fn sync(&self, alias: &str) -> Result<Balance, RuntimeError> {
        if self.state.sync_hangs.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.state.sync_fails.load(Ordering::SeqCst) {
            return Err(RuntimeError::Network("ledger unreachable".into()));
        }
        let available = self.state.balance(alias);
        Ok(Balance { available, total: available })
    }

    async fn addresses(&self, alias: &str) -> Result<Vec<String>, RuntimeError> {
        if self.state.derived.lock().unwrap().contains(alias) {
            Ok(vec![mock_address(alias)])
        } else {
            Ok(Vec::new())
        }
    }

    async fn generate_address(&self, alias: &str) -> Result<String, RuntimeError> {
        self.state.derived.lock().unwrap().insert(alias.to_string());
        Ok(mock_address(alias))
    }

    async fn send(
        &self,
        alias: &str,
        outputs: &[TransferOutput],
        _allow_micro_amount: bool,
    ) -> Result<TransferReceipt, RuntimeError> {
        if self.state.sends_fail.load(Ordering::SeqCst) {
            return Err(RuntimeError::Network("node unreachable".into()));
        }
        let mut balances = self.state.balances.lock().unwrap();
        let available = balances.get(alias).copied().unwrap_or(0);
        let total: u64 = outputs.iter().map(|o| o.amount).sum();
        if available < total {
            return Err(RuntimeError::InsufficientBalance { need: total, have: available });
        }
        balances.insert(alias.to_string(), available - total);
        drop(balances);

        let mut sent = self.state.sent.lock().unwrap();
        for output in outputs {
            sent.push((output.address.clone(), output.amount));
        }
        Ok(TransferReceipt {
            transaction_id: format!("tx-{}", sent.len()),
            block_id: Some(format!("block-{}", sent.len())),
        })
    }
}

pub struct MockProvider {
    pub state: Arc<MockState>,
    pub snapshot_dir: PathBuf,
    /// Artificial construction latency, to widen race windows.
    pub open_delay: Duration,
}

impl MockProvider {
    pub fn new(state: Arc<MockState>, snapshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            state,
            snapshot_dir: snapshot_dir.into(),
            open_delay: Duration::from_millis(20),
        }
    }
}

#[async_trait]
impl RuntimeProvider for MockProvider {
    async fn open(&self, wallet_id: &str) -> Result<Arc<dyn VaultRuntime>, RuntimeError> {
        if self.state.fail_next_opens.load(Ordering::SeqCst) > 0 {
            self.state.fail_next_opens.fetch_sub(1, Ordering::SeqCst);
            return Err(RuntimeError::Storage("simulated open failure".into()));
        }
        tokio::time::sleep(self.open_delay).await;
        self.state.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockRuntime {
            wallet_id: wallet_id.to_string(),
            state: self.state.clone(),
            snapshot_path: SecretSnapshot::path_for(&self.snapshot_dir, wallet_id),
        }))
    }
}

/// Faucet double that credits the mock ledger on success and can be
/// switched to fail.
pub struct MockFaucet {
    pub state: Arc<MockState>,
    pub fail: AtomicBool,
    pub requests: Mutex<Vec<(String, u64)>>,
}

impl MockFaucet {
    pub fn new(state: Arc<MockState>) -> Self {
        Self {
            state,
            fail: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl FaucetApi for MockFaucet {
    async fn request(&self, address: &str, amount_base: u64) -> Result<FaucetGrant, ServiceError> {
        self.requests
            .lock()
            .unwrap()
            .push((address.to_string(), amount_base));
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Network { message: "faucet unreachable".into() });
        }

        // Credit whichever wallet owns the address (mock addresses embed
        // the wallet id).
        if let Some(wallet_id) = address.strip_prefix("rms1mock") {
            let mut balances = self.state.balances.lock().unwrap();
            let entry = balances.entry(wallet_id.to_string()).or_insert(0);
            *entry += amount_base;
        }

        Ok(FaucetGrant {
            transaction_id: "faucet-tx-1".into(),
            amount: Some(amount_base),
        })
    }
}
