//! The vault runtime seam.
//!
//! `VaultRuntime` is the handle the coordinator drives: mnemonic storage,
//! account creation, sync, address derivation, and sends. `RuntimeProvider`
//! constructs handles. The production `StrongboxRuntime` binds a per-wallet
//! database path, per-wallet snapshot, the fixed node list, and the vault
//! password; tests substitute mocks through the traits.

use crate::error::RuntimeError;
use crate::node::{NodeClient, TransferRequestOutput};
use crate::snapshot::{SecretSnapshot, SnapshotSecrets};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vaultline_types::NetworkConfig;

/// Base-unit balance of an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balance {
    pub available: u64,
    pub total: u64,
}

/// One output of a transfer.
#[derive(Debug, Clone)]
pub struct TransferOutput {
    pub address: String,
    pub amount: u64,
}

/// Receipt returned by the ledger for a submitted transfer.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub transaction_id: String,
    pub block_id: Option<String>,
}

/// In-memory handle to an opened vault.
///
/// A handle is owned exclusively by the coordinator's cache; at most one
/// exists per wallet id at any time.
#[async_trait]
pub trait VaultRuntime: Send + Sync {
    /// Store a mnemonic in the vault. Fails if one is already stored.
    async fn store_mnemonic(&self, mnemonic: &str) -> Result<(), RuntimeError>;

    /// Create an account under the given alias. Idempotent.
    async fn create_account(&self, alias: &str) -> Result<(), RuntimeError>;

    /// Whether an account with the alias exists.
    async fn account_exists(&self, alias: &str) -> Result<bool, RuntimeError>;

    /// Sync the account against the ledger and return its balance.
    async fn sync(&self, alias: &str) -> Result<Balance, RuntimeError>;

    /// Previously derived addresses for the account, oldest first.
    async fn addresses(&self, alias: &str) -> Result<Vec<String>, RuntimeError>;

    /// Derive and persist the account's next address.
    async fn generate_address(&self, alias: &str) -> Result<String, RuntimeError>;

    /// Submit a transfer from the account.
    async fn send(
        &self,
        alias: &str,
        outputs: &[TransferOutput],
        allow_micro_amount: bool,
    ) -> Result<TransferReceipt, RuntimeError>;
}

/// Constructs vault runtime handles.
#[async_trait]
pub trait RuntimeProvider: Send + Sync {
    async fn open(&self, wallet_id: &str) -> Result<Arc<dyn VaultRuntime>, RuntimeError>;
}

/// Configuration for one wallet's runtime handle.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Per-wallet database directory.
    pub db_path: PathBuf,
    /// Per-wallet secret snapshot file.
    pub snapshot_path: PathBuf,
    pub network: NetworkConfig,
    pub password: String,
    /// Timeout applied to each node request.
    pub node_timeout: Duration,
}

/// Production vault runtime over a sealed snapshot and the node client.
pub struct StrongboxRuntime {
    snapshot: SecretSnapshot,
    node: NodeClient,
    password: String,
    secrets: Mutex<Option<SnapshotSecrets>>,
}

impl StrongboxRuntime {
    /// Open a handle bound to the configured paths.
    ///
    /// If a snapshot already exists it is decrypted now; this doubles as the
    /// "set password" step, tolerating an already-initialized vault. A wrong
    /// password surfaces as `Crypto`.
    pub fn open(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        std::fs::create_dir_all(&config.db_path)?;

        let snapshot = SecretSnapshot::new(&config.snapshot_path);
        let secrets = if snapshot.exists() {
            log::debug!(
                "snapshot exists at {}, password already set",
                config.snapshot_path.display()
            );
            Some(snapshot.open(&config.password)?)
        } else {
            None
        };

        Ok(Self {
            snapshot,
            node: NodeClient::new(&config.network, config.node_timeout)?,
            password: config.password.clone(),
            secrets: Mutex::new(secrets),
        })
    }

    fn with_secrets<T>(
        &self,
        f: impl FnOnce(&mut SnapshotSecrets) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        let mut guard = self
            .secrets
            .lock()
            .map_err(|e| RuntimeError::Storage(e.to_string()))?;
        let secrets = guard.as_mut().ok_or_else(|| RuntimeError::SnapshotMissing {
            path: self.snapshot.path().display().to_string(),
        })?;
        f(secrets)
    }

    /// Persist the current secrets back to the sealed snapshot.
    fn persist(&self, secrets: &SnapshotSecrets) -> Result<(), RuntimeError> {
        self.snapshot.seal(secrets, &self.password)
    }

    fn derived_address(seed: &[u8], alias: &str, index: u32) -> String {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(alias.as_bytes());
        hasher.update(index.to_le_bytes());
        let digest = hasher.finalize();
        format!("rms1{}", &hex::encode(digest)[..56])
    }

    fn seed_for(secrets: &SnapshotSecrets) -> Result<Vec<u8>, RuntimeError> {
        let mnemonic = bip39::Mnemonic::parse(&secrets.mnemonic)
            .map_err(|e| RuntimeError::Crypto(format!("invalid stored mnemonic: {}", e)))?;
        Ok(mnemonic.to_seed("").to_vec())
    }

    fn first_address(&self, alias: &str) -> Result<Option<String>, RuntimeError> {
        self.with_secrets(|secrets| {
            if !secrets.accounts.iter().any(|a| a == alias) {
                return Err(RuntimeError::AccountNotFound(alias.to_string()));
            }
            let count = secrets.address_counts.get(alias).copied().unwrap_or(0);
            if count == 0 {
                return Ok(None);
            }
            let seed = Self::seed_for(secrets)?;
            Ok(Some(Self::derived_address(&seed, alias, 0)))
        })
    }
}

#[async_trait]
impl VaultRuntime for StrongboxRuntime {
    async fn store_mnemonic(&self, mnemonic: &str) -> Result<(), RuntimeError> {
        bip39::Mnemonic::parse(mnemonic)
            .map_err(|e| RuntimeError::Crypto(format!("invalid mnemonic: {}", e)))?;

        let mut guard = self
            .secrets
            .lock()
            .map_err(|e| RuntimeError::Storage(e.to_string()))?;
        if guard.is_some() {
            return Err(RuntimeError::Storage("mnemonic already stored".into()));
        }

        let secrets = SnapshotSecrets {
            mnemonic: mnemonic.to_string(),
            accounts: Vec::new(),
            address_counts: Default::default(),
        };
        self.persist(&secrets)?;
        *guard = Some(secrets);
        Ok(())
    }

    async fn create_account(&self, alias: &str) -> Result<(), RuntimeError> {
        let updated = self.with_secrets(|secrets| {
            if secrets.accounts.iter().any(|a| a == alias) {
                log::debug!("account {} already exists, skipping create", alias);
                return Ok(None);
            }
            secrets.accounts.push(alias.to_string());
            Ok(Some(secrets.clone()))
        })?;
        if let Some(secrets) = updated {
            self.persist(&secrets)?;
        }
        Ok(())
    }

    async fn account_exists(&self, alias: &str) -> Result<bool, RuntimeError> {
        let guard = self
            .secrets
            .lock()
            .map_err(|e| RuntimeError::Storage(e.to_string()))?;
        Ok(guard
            .as_ref()
            .map(|s| s.accounts.iter().any(|a| a == alias))
            .unwrap_or(false))
    }

    async fn sync(&self, alias: &str) -> Result<Balance, RuntimeError> {
        let address = match self.first_address(alias)? {
            Some(addr) => addr,
            // Nothing derived yet, so nothing can be on-ledger.
            None => return Ok(Balance::default()),
        };

        let balance = self.node.balance(&address).await?;
        let available = balance.available_base();
        let total = balance.total.parse::<u64>().unwrap_or(available);
        Ok(Balance { available, total })
    }

    async fn addresses(&self, alias: &str) -> Result<Vec<String>, RuntimeError> {
        self.with_secrets(|secrets| {
            if !secrets.accounts.iter().any(|a| a == alias) {
                return Err(RuntimeError::AccountNotFound(alias.to_string()));
            }
            let count = secrets.address_counts.get(alias).copied().unwrap_or(0);
            if count == 0 {
                return Ok(Vec::new());
            }
            let seed = Self::seed_for(secrets)?;
            Ok((0..count)
                .map(|i| Self::derived_address(&seed, alias, i))
                .collect())
        })
    }

    async fn generate_address(&self, alias: &str) -> Result<String, RuntimeError> {
        let (address, secrets) = self.with_secrets(|secrets| {
            if !secrets.accounts.iter().any(|a| a == alias) {
                return Err(RuntimeError::AccountNotFound(alias.to_string()));
            }
            let count = secrets.address_counts.entry(alias.to_string()).or_insert(0);
            let seed = {
                let mnemonic = bip39::Mnemonic::parse(&secrets.mnemonic)
                    .map_err(|e| RuntimeError::Crypto(format!("invalid stored mnemonic: {}", e)))?;
                mnemonic.to_seed("").to_vec()
            };
            let address = Self::derived_address(&seed, alias, *count);
            *count += 1;
            Ok((address, secrets.clone()))
        })?;
        self.persist(&secrets)?;
        Ok(address)
    }

    async fn send(
        &self,
        alias: &str,
        outputs: &[TransferOutput],
        allow_micro_amount: bool,
    ) -> Result<TransferReceipt, RuntimeError> {
        // The sender account must exist with at least one derived address.
        if self.first_address(alias)?.is_none() {
            return Err(RuntimeError::AccountNotFound(format!(
                "{} has no derived addresses",
                alias
            )));
        }

        let wire_outputs: Vec<TransferRequestOutput> = outputs
            .iter()
            .map(|o| TransferRequestOutput {
                address: o.address.clone(),
                amount: o.amount.to_string(),
            })
            .collect();

        let (transaction_id, block_id) =
            self.node.submit_transfer(&wire_outputs, allow_micro_amount).await?;
        Ok(TransferReceipt { transaction_id, block_id })
    }
}

/// Production `RuntimeProvider` binding per-wallet paths under fixed roots.
pub struct StrongboxProvider {
    db_dir: PathBuf,
    snapshot_dir: PathBuf,
    network: NetworkConfig,
    password: String,
    node_timeout: Duration,
}

impl StrongboxProvider {
    pub fn new(
        db_dir: impl Into<PathBuf>,
        snapshot_dir: impl Into<PathBuf>,
        network: NetworkConfig,
        password: impl Into<String>,
        node_timeout: Duration,
    ) -> Self {
        Self {
            db_dir: db_dir.into(),
            snapshot_dir: snapshot_dir.into(),
            network,
            password: password.into(),
            node_timeout,
        }
    }

    /// Runtime configuration for a wallet id.
    pub fn config_for(&self, wallet_id: &str) -> RuntimeConfig {
        RuntimeConfig {
            db_path: self.db_dir.join(wallet_id),
            snapshot_path: SecretSnapshot::path_for(&self.snapshot_dir, wallet_id),
            network: self.network.clone(),
            password: self.password.clone(),
            node_timeout: self.node_timeout,
        }
    }
}

#[async_trait]
impl RuntimeProvider for StrongboxProvider {
    async fn open(&self, wallet_id: &str) -> Result<Arc<dyn VaultRuntime>, RuntimeError> {
        let config = self.config_for(wallet_id);
        log::debug!(
            "opening vault runtime for wallet {} (db {}, snapshot {})",
            wallet_id,
            config.db_path.display(),
            config.snapshot_path.display()
        );
        let runtime = StrongboxRuntime::open(&config)?;
        Ok(Arc::new(runtime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path, wallet_id: &str) -> RuntimeConfig {
        RuntimeConfig {
            db_path: dir.join("db").join(wallet_id),
            snapshot_path: SecretSnapshot::path_for(&dir.join("snapshots"), wallet_id),
            network: NetworkConfig::testnet(),
            password: "test-password".into(),
            node_timeout: Duration::from_secs(5),
        }
    }

    fn mnemonic() -> String {
        bip39::Mnemonic::from_entropy(&[7u8; 32]).unwrap().to_string()
    }

    #[tokio::test]
    async fn test_store_create_and_derive() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "w1");
        let rt = StrongboxRuntime::open(&config).unwrap();

        rt.store_mnemonic(&mnemonic()).await.unwrap();
        rt.create_account("w1").await.unwrap();
        assert!(rt.account_exists("w1").await.unwrap());

        assert!(rt.addresses("w1").await.unwrap().is_empty());
        let addr = rt.generate_address("w1").await.unwrap();
        assert!(addr.starts_with("rms1"));
        assert_eq!(rt.addresses("w1").await.unwrap(), vec![addr.clone()]);

        // Same derivation inputs, same address.
        let rt2 = StrongboxRuntime::open(&config).unwrap();
        assert_eq!(rt2.addresses("w1").await.unwrap(), vec![addr]);
    }

    #[tokio::test]
    async fn test_store_mnemonic_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "w1");
        let rt = StrongboxRuntime::open(&config).unwrap();

        rt.store_mnemonic(&mnemonic()).await.unwrap();
        assert!(rt.store_mnemonic(&mnemonic()).await.is_err());
    }

    #[tokio::test]
    async fn test_create_account_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "w1");
        let rt = StrongboxRuntime::open(&config).unwrap();

        rt.store_mnemonic(&mnemonic()).await.unwrap();
        rt.create_account("w1").await.unwrap();
        rt.create_account("w1").await.unwrap();
        assert!(rt.account_exists("w1").await.unwrap());
    }

    #[tokio::test]
    async fn test_reopen_with_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "w1");
        let rt = StrongboxRuntime::open(&config).unwrap();
        rt.store_mnemonic(&mnemonic()).await.unwrap();

        let mut bad = config.clone();
        bad.password = "wrong".into();
        assert!(matches!(
            StrongboxRuntime::open(&bad),
            Err(RuntimeError::Crypto(_))
        ));
    }

    #[tokio::test]
    async fn test_operations_without_mnemonic_fail() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "w1");
        let rt = StrongboxRuntime::open(&config).unwrap();

        assert!(matches!(
            rt.create_account("w1").await,
            Err(RuntimeError::SnapshotMissing { .. })
        ));
        assert!(!rt.account_exists("w1").await.unwrap());
    }

    #[tokio::test]
    async fn test_sync_without_addresses_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "w1");
        let rt = StrongboxRuntime::open(&config).unwrap();
        rt.store_mnemonic(&mnemonic()).await.unwrap();
        rt.create_account("w1").await.unwrap();

        // No derived address means no on-ledger footprint and no node call.
        assert_eq!(rt.sync("w1").await.unwrap(), Balance::default());
    }
}
