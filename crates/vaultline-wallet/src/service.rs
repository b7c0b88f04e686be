//! Domain wallet operations.
//!
//! Every vault-touching step runs through the coordinator's queue; nested
//! runtime calls carry their own shorter ceilings so a hang is detected at
//! the most specific level first. Read operations (address, balance, sync)
//! prefer cached or deterministic fallback data over throwing; mutating
//! operations (create, transfer) always surface errors.

use crate::coordinator::WalletCoordinator;
use crate::error::ServiceError;
use crate::fallback::deterministic_address;
use crate::faucet::FaucetApi;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use vaultline_runtime::{FileLock, RuntimeError, RuntimeProvider, SecretSnapshot, TransferOutput, VaultRuntime};
use vaultline_types::{base_to_display, display_to_base, TOKEN_SYMBOL};

/// Service tuning knobs.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding per-wallet secret snapshots.
    pub snapshot_dir: PathBuf,
    /// Ceiling for account-level runtime calls (sync, address derivation).
    pub account_timeout: Duration,
    /// Ceiling for the send step.
    pub send_timeout: Duration,
    /// Delay before the post-faucet balance re-check.
    pub faucet_recheck_delay: Duration,
}

impl ServiceConfig {
    pub fn new(snapshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_dir: snapshot_dir.into(),
            account_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(60),
            faucet_recheck_delay: Duration::from_secs(30),
        }
    }
}

/// Cached wallet metadata.
#[derive(Debug, Clone, Serialize)]
pub struct WalletMeta {
    pub id: String,
    pub user_id: Option<String>,
    pub address: Option<String>,
    /// Cached balance in base units; never surfaced directly.
    pub balance: u64,
    /// Address came from the deterministic fallback, not the vault.
    pub generated_address: bool,
    /// Wallet was re-created by a reset.
    pub recovered: bool,
    pub created_at: String,
    pub last_updated: String,
}

impl WalletMeta {
    fn new(id: &str, user_id: Option<&str>) -> Self {
        let now = now_rfc3339();
        Self {
            id: id.to_string(),
            user_id: user_id.map(str::to_string),
            address: None,
            balance: 0,
            generated_address: false,
            recovered: false,
            created_at: now.clone(),
            last_updated: now,
        }
    }
}

/// Result of `create_wallet`. The mnemonic is returned here and never again.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedWallet {
    pub id: String,
    pub address: String,
    pub balance: f64,
    pub mnemonic: Option<String>,
    /// Address is the deterministic fallback, not vault-derived.
    pub generated_address: bool,
    /// Present when creation degraded instead of failing outright.
    pub warning: Option<String>,
}

/// Result of a transfer. Amounts in display units.
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub transaction_id: String,
    pub block_id: Option<String>,
    pub amount: f64,
    pub recipient: String,
    pub new_balance: f64,
    /// `queued` or `direct`.
    pub method: &'static str,
}

/// Result of a faucet request. Amounts in display units.
#[derive(Debug, Clone, Serialize)]
pub struct FaucetOutcome {
    pub wallet_id: String,
    pub address: String,
    pub requested_amount: f64,
    /// Amount the faucet acknowledged (authoritative), display units.
    pub amount: f64,
    pub token_symbol: &'static str,
    pub transaction_id: String,
    /// `requested` or `offline_fallback`.
    pub status: &'static str,
    pub message: Option<String>,
    pub old_balance: f64,
    pub new_balance: f64,
}

/// Result of `sync_wallet`. Amounts in display units.
#[derive(Debug, Clone, Serialize)]
pub struct SyncedWallet {
    pub id: String,
    pub address: String,
    pub balance: f64,
    pub token_symbol: &'static str,
    pub last_updated: String,
    /// Data came from the cache because the ledger was unreachable.
    pub offline: bool,
}

struct ServiceInner {
    coordinator: WalletCoordinator,
    provider: Arc<dyn RuntimeProvider>,
    faucet: Arc<dyn FaucetApi>,
    config: ServiceConfig,
    metas: StdMutex<HashMap<String, WalletMeta>>,
    /// Wallet ids with a reset in flight; collapses concurrent recoveries.
    recovering: StdMutex<HashSet<String>>,
}

/// High-level wallet operations over the coordinator.
#[derive(Clone)]
pub struct WalletService {
    inner: Arc<ServiceInner>,
}

impl WalletService {
    pub fn new(
        coordinator: WalletCoordinator,
        provider: Arc<dyn RuntimeProvider>,
        faucet: Arc<dyn FaucetApi>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                coordinator,
                provider,
                faucet,
                config,
                metas: StdMutex::new(HashMap::new()),
                recovering: StdMutex::new(HashSet::new()),
            }),
        }
    }

    /// Cached metadata for a wallet, if any.
    pub fn wallet_meta(&self, wallet_id: &str) -> Option<WalletMeta> {
        self.lock_metas().get(wallet_id).cloned()
    }

    // ── Create / delete / reset ──────────────────────────────────────────

    /// Create a wallet: generate and store a 24-word mnemonic, create the
    /// account aliased to the wallet id, sync, and derive the first address.
    ///
    /// A second create for the same wallet id fails until `reset_wallet` or
    /// `delete_wallet`. Address derivation failures degrade to the
    /// deterministic fallback — creation always returns a usable address.
    pub async fn create_wallet(
        &self,
        user_id: &str,
        wallet_id: &str,
    ) -> Result<CreatedWallet, ServiceError> {
        validate_id("user id", user_id)?;
        validate_id("wallet id", wallet_id)?;

        if self.lock_metas().contains_key(wallet_id) {
            return Err(ServiceError::Validation(format!(
                "wallet {} already exists; reset it first",
                wallet_id
            )));
        }

        log::info!("creating wallet {} for user {}", wallet_id, user_id);

        // Remove any stray snapshot from an earlier failed attempt so the
        // vault starts clean.
        self.snapshot(wallet_id).remove()?;
        self.inner.coordinator.evict(wallet_id).await;

        let account_timeout = self.inner.config.account_timeout;
        let id = wallet_id.to_string();
        let queued = self
            .inner
            .coordinator
            .execute(wallet_id, move |rt| async move {
                let mnemonic = generate_mnemonic()?;
                with_timeout(account_timeout, "store mnemonic", rt.store_mnemonic(&mnemonic))
                    .await?;
                with_timeout(account_timeout, "create account", rt.create_account(&id)).await?;

                // Sync is best-effort here; a fresh account has nothing
                // on-ledger yet.
                if let Err(e) = with_timeout(account_timeout, "sync", rt.sync(&id)).await {
                    log::warn!("sync during creation failed for wallet {}: {}", id, e);
                }

                let address = match first_or_generated_address(&rt, &id, account_timeout).await {
                    Ok(address) => Ok::<_, ServiceError>((address, false)),
                    Err(e) => {
                        log::warn!(
                            "address derivation failed for wallet {}: {} (using fallback)",
                            id,
                            e
                        );
                        Ok((deterministic_address(&id), true))
                    }
                }?;

                Ok((mnemonic, address))
            })
            .await;

        match queued {
            Ok((mnemonic, (address, generated))) => {
                self.store_meta(wallet_id, Some(user_id), |meta| {
                    meta.address = Some(address.clone());
                    meta.generated_address = generated;
                });
                Ok(CreatedWallet {
                    id: wallet_id.to_string(),
                    address,
                    balance: 0.0,
                    mnemonic: Some(mnemonic),
                    generated_address: generated,
                    warning: None,
                })
            }
            Err(e) => {
                // Degrade rather than fail: the wallet is usable with a
                // deterministic address, though nothing was vaulted.
                log::error!("wallet creation degraded for {}: {}", wallet_id, e);
                let address = deterministic_address(wallet_id);
                self.store_meta(wallet_id, Some(user_id), |meta| {
                    meta.address = Some(address.clone());
                    meta.generated_address = true;
                });
                Ok(CreatedWallet {
                    id: wallet_id.to_string(),
                    address,
                    balance: 0.0,
                    mnemonic: None,
                    generated_address: true,
                    warning: Some(e.to_string()),
                })
            }
        }
    }

    /// Purge the wallet's cache entries and remove its secret snapshot.
    pub async fn delete_wallet(&self, wallet_id: &str) -> Result<(), ServiceError> {
        validate_id("wallet id", wallet_id)?;
        log::info!("deleting wallet {}", wallet_id);

        self.lock_metas().remove(wallet_id);
        self.inner.coordinator.evict(wallet_id).await;
        self.snapshot(wallet_id).remove()?;
        Ok(())
    }

    /// Delete and re-create a wallet (the `vaultMissing` recovery path).
    ///
    /// Concurrent resets for the same wallet collapse into one attempt; the
    /// losers fail fast with a validation error.
    pub async fn reset_wallet(
        &self,
        user_id: &str,
        wallet_id: &str,
    ) -> Result<CreatedWallet, ServiceError> {
        validate_id("user id", user_id)?;
        validate_id("wallet id", wallet_id)?;

        {
            let mut recovering = self.lock_recovering();
            if !recovering.insert(wallet_id.to_string()) {
                return Err(ServiceError::Validation(format!(
                    "recovery already in progress for wallet {}",
                    wallet_id
                )));
            }
        }

        log::warn!("resetting wallet {} for user {}", wallet_id, user_id);
        let result = async {
            self.delete_wallet(wallet_id).await?;
            let mut created = self.create_wallet(user_id, wallet_id).await?;
            self.store_meta(wallet_id, Some(user_id), |meta| meta.recovered = true);
            created.warning = created
                .warning
                .or_else(|| Some("wallet was reset and re-created".to_string()));
            Ok(created)
        }
        .await;

        self.lock_recovering().remove(wallet_id);
        result
    }

    // ── Address / balance / sync ─────────────────────────────────────────

    /// The wallet's receive address: cached if known, else derived via the
    /// account, else the deterministic fallback (cached and tagged
    /// "generated").
    pub async fn get_wallet_address(&self, wallet_id: &str) -> Result<String, ServiceError> {
        validate_id("wallet id", wallet_id)?;

        if let Some(address) = self
            .lock_metas()
            .get(wallet_id)
            .and_then(|m| m.address.clone())
        {
            log::debug!("returning cached address for wallet {}", wallet_id);
            return Ok(address);
        }

        let account_timeout = self.inner.config.account_timeout;
        let id = wallet_id.to_string();
        let queued = self
            .inner
            .coordinator
            .execute(wallet_id, move |rt| async move {
                if let Err(e) = with_timeout(account_timeout, "sync", rt.sync(&id)).await {
                    log::warn!("sync before address fetch failed: {} (continuing)", e);
                }
                first_or_generated_address(&rt, &id, account_timeout).await
            })
            .await;

        match queued {
            Ok(address) => {
                self.store_meta(wallet_id, None, |meta| {
                    meta.address = Some(address.clone());
                });
                Ok(address)
            }
            Err(e) => {
                log::error!("error getting address for wallet {}: {}", wallet_id, e);
                if let Some(address) = self
                    .lock_metas()
                    .get(wallet_id)
                    .and_then(|m| m.address.clone())
                {
                    return Ok(address);
                }
                let address = deterministic_address(wallet_id);
                self.store_meta(wallet_id, None, |meta| {
                    meta.address = Some(address.clone());
                    meta.generated_address = true;
                });
                Ok(address)
            }
        }
    }

    /// The wallet's available balance in display units. Falls back to the
    /// cached value (or zero) on failure rather than throwing.
    pub async fn get_wallet_balance(&self, wallet_id: &str) -> Result<f64, ServiceError> {
        Ok(base_to_display(self.balance_base(wallet_id).await?))
    }

    /// Combined balance and address refresh. Returns offline-tagged cached
    /// data when the ledger is unreachable.
    pub async fn sync_wallet(&self, wallet_id: &str) -> Result<SyncedWallet, ServiceError> {
        validate_id("wallet id", wallet_id)?;

        let account_timeout = self.inner.config.account_timeout;
        let id = wallet_id.to_string();
        let queued = self
            .inner
            .coordinator
            .execute(wallet_id, move |rt| async move {
                let balance = with_timeout(account_timeout, "sync", rt.sync(&id)).await?;
                let address = first_or_generated_address(&rt, &id, account_timeout).await?;
                Ok((balance.available, address))
            })
            .await;

        match queued {
            Ok((balance, address)) => {
                self.store_meta(wallet_id, None, |meta| {
                    meta.balance = balance;
                    meta.address = Some(address.clone());
                });
                Ok(SyncedWallet {
                    id: wallet_id.to_string(),
                    address,
                    balance: base_to_display(balance),
                    token_symbol: TOKEN_SYMBOL,
                    last_updated: now_rfc3339(),
                    offline: false,
                })
            }
            Err(e) => {
                log::error!("error syncing wallet {}: {} (returning cached data)", wallet_id, e);
                let meta = self
                    .wallet_meta(wallet_id)
                    .unwrap_or_else(|| WalletMeta::new(wallet_id, None));
                let address = meta
                    .address
                    .unwrap_or_else(|| deterministic_address(wallet_id));
                Ok(SyncedWallet {
                    id: wallet_id.to_string(),
                    address,
                    balance: base_to_display(meta.balance),
                    token_symbol: TOKEN_SYMBOL,
                    last_updated: meta.last_updated,
                    offline: true,
                })
            }
        }
    }

    // ── Transfer ─────────────────────────────────────────────────────────

    /// Transfer `amount_base` base units to `recipient`.
    ///
    /// `prefer_direct` bypasses the shared queue with a short-lived handle
    /// (still under the per-wallet file lock); otherwise the queued path is
    /// used, with one direct retry after a retryable queue failure.
    pub async fn transfer_tokens(
        &self,
        wallet_id: &str,
        recipient: &str,
        amount_base: u64,
        prefer_direct: bool,
    ) -> Result<TransferResult, ServiceError> {
        validate_id("wallet id", wallet_id)?;
        validate_id("recipient address", recipient)?;
        if amount_base == 0 {
            return Err(ServiceError::Validation("amount must be positive".into()));
        }

        let snapshot = self.snapshot(wallet_id);
        if !snapshot.exists() {
            return Err(ServiceError::VaultMissing {
                message: format!("secret snapshot not found for wallet {}", wallet_id),
            });
        }

        log::info!(
            "transferring {} base units from wallet {} to {}",
            amount_base,
            wallet_id,
            recipient
        );

        let result = if prefer_direct {
            match self.transfer_direct(wallet_id, recipient, amount_base).await {
                Ok(result) => Ok(result),
                Err(e) if e.is_retryable_via_direct() => {
                    log::warn!("direct transfer failed: {} (falling back to queue)", e);
                    self.transfer_queued(wallet_id, recipient, amount_base).await
                }
                Err(e) => Err(e),
            }
        } else {
            match self.transfer_queued(wallet_id, recipient, amount_base).await {
                Ok(result) => Ok(result),
                Err(e) if e.is_retryable_via_direct() => {
                    log::warn!("queued transfer failed: {} (retrying via direct path)", e);
                    self.transfer_direct(wallet_id, recipient, amount_base).await
                }
                Err(e) => Err(e),
            }
        }?;

        self.store_meta(wallet_id, None, |meta| {
            meta.balance = display_to_base(result.new_balance);
        });
        Ok(result)
    }

    /// Queued transfer: the shared coordinator serializes the whole
    /// sync-check-send sequence.
    async fn transfer_queued(
        &self,
        wallet_id: &str,
        recipient: &str,
        amount_base: u64,
    ) -> Result<TransferResult, ServiceError> {
        let account_timeout = self.inner.config.account_timeout;
        let send_timeout = self.inner.config.send_timeout;
        let id = wallet_id.to_string();
        let to = recipient.to_string();

        self.inner
            .coordinator
            .execute(wallet_id, move |rt| async move {
                send_with_balance_check(&rt, &id, &to, amount_base, account_timeout, send_timeout)
                    .await
                    .map(|(receipt, available)| TransferResult {
                        transaction_id: receipt.transaction_id,
                        block_id: receipt.block_id,
                        amount: base_to_display(amount_base),
                        recipient: to.clone(),
                        new_balance: base_to_display(available - amount_base),
                        method: "queued",
                    })
            })
            .await
    }

    /// Direct transfer: a short-lived handle outside the shared cache, but
    /// still under the per-wallet file lock so it cannot interleave with a
    /// queued operation on the same wallet.
    async fn transfer_direct(
        &self,
        wallet_id: &str,
        recipient: &str,
        amount_base: u64,
    ) -> Result<TransferResult, ServiceError> {
        let lock = FileLock::acquire(
            self.inner.coordinator.lock_dir(),
            wallet_id,
            self.inner.coordinator.stale_lock_age(),
        )
        .map_err(ServiceError::from)?;

        let result = async {
            let rt = self.inner.provider.open(wallet_id).await?;
            send_with_balance_check(
                &rt,
                wallet_id,
                recipient,
                amount_base,
                self.inner.config.account_timeout,
                self.inner.config.send_timeout,
            )
            .await
        }
        .await;

        lock.release();

        result.map(|(receipt, available)| TransferResult {
            transaction_id: receipt.transaction_id,
            block_id: receipt.block_id,
            amount: base_to_display(amount_base),
            recipient: recipient.to_string(),
            new_balance: base_to_display(available - amount_base),
            method: "direct",
        })
    }

    // ── Faucet ───────────────────────────────────────────────────────────

    /// Request `display_amount` tokens from the faucet.
    ///
    /// The amount the faucet acknowledges is authoritative. On faucet
    /// failure this returns an `offline_fallback` outcome carrying the
    /// requested amount instead of an error, so the wallet can still be
    /// credited locally.
    pub async fn request_faucet_tokens(
        &self,
        wallet_id: &str,
        display_amount: f64,
    ) -> Result<FaucetOutcome, ServiceError> {
        validate_id("wallet id", wallet_id)?;
        let requested_base = display_to_base(display_amount);
        if requested_base == 0 {
            return Err(ServiceError::Validation("amount must be positive".into()));
        }

        log::info!(
            "requesting {} {} ({} base units) for wallet {}",
            display_amount,
            TOKEN_SYMBOL,
            requested_base,
            wallet_id
        );

        // Address resolution already degrades to the deterministic
        // fallback internally.
        let address = self.get_wallet_address(wallet_id).await?;

        // Read the pre-request balance now; the ledger may credit before
        // the response arrives.
        let old_balance = self.balance_base(wallet_id).await.unwrap_or(0);

        match self.inner.faucet.request(&address, requested_base).await {
            Ok(grant) => {
                let granted_base = grant.amount.unwrap_or(requested_base);
                let new_balance = old_balance + granted_base;

                // Optimistic cache update; the ledger catches up later.
                self.store_meta(wallet_id, None, |meta| meta.balance = new_balance);
                self.schedule_balance_recheck(wallet_id);

                Ok(FaucetOutcome {
                    wallet_id: wallet_id.to_string(),
                    address,
                    requested_amount: display_amount,
                    amount: base_to_display(granted_base),
                    token_symbol: TOKEN_SYMBOL,
                    transaction_id: grant.transaction_id,
                    status: "requested",
                    message: None,
                    old_balance: base_to_display(old_balance),
                    new_balance: base_to_display(new_balance),
                })
            }
            Err(e) => {
                log::error!("faucet request failed for wallet {}: {}", wallet_id, e);
                Ok(FaucetOutcome {
                    wallet_id: wallet_id.to_string(),
                    address,
                    requested_amount: display_amount,
                    amount: display_amount,
                    token_symbol: TOKEN_SYMBOL,
                    transaction_id: format!("offline_fallback_{}", chrono::Utc::now().timestamp_millis()),
                    status: "offline_fallback",
                    message: Some(format!("faucet error: {}", e)),
                    old_balance: base_to_display(old_balance),
                    new_balance: base_to_display(old_balance),
                })
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────────────

    /// Available balance in base units; cached value (or zero) on failure.
    async fn balance_base(&self, wallet_id: &str) -> Result<u64, ServiceError> {
        validate_id("wallet id", wallet_id)?;

        let account_timeout = self.inner.config.account_timeout;
        let id = wallet_id.to_string();
        let queued = self
            .inner
            .coordinator
            .execute(wallet_id, move |rt| async move {
                let balance = with_timeout(account_timeout, "sync", rt.sync(&id)).await?;
                Ok(balance.available)
            })
            .await;

        match queued {
            Ok(balance) => {
                self.store_meta(wallet_id, None, |meta| meta.balance = balance);
                Ok(balance)
            }
            Err(e) => {
                log::error!(
                    "error getting balance for wallet {}: {} (using cached value)",
                    wallet_id,
                    e
                );
                Ok(self.wallet_meta(wallet_id).map(|m| m.balance).unwrap_or(0))
            }
        }
    }

    fn schedule_balance_recheck(&self, wallet_id: &str) {
        let service = self.clone();
        let wallet_id = wallet_id.to_string();
        let delay = self.inner.config.faucet_recheck_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match service.balance_base(&wallet_id).await {
                Ok(balance) => log::debug!(
                    "post-faucet balance re-check for wallet {}: {} base units",
                    wallet_id,
                    balance
                ),
                Err(e) => log::warn!(
                    "post-faucet balance re-check failed for wallet {}: {}",
                    wallet_id,
                    e
                ),
            }
        });
    }

    fn snapshot(&self, wallet_id: &str) -> SecretSnapshot {
        SecretSnapshot::new(SecretSnapshot::path_for(
            &self.inner.config.snapshot_dir,
            wallet_id,
        ))
    }

    fn store_meta(
        &self,
        wallet_id: &str,
        user_id: Option<&str>,
        update: impl FnOnce(&mut WalletMeta),
    ) {
        let mut metas = self.lock_metas();
        let meta = metas
            .entry(wallet_id.to_string())
            .or_insert_with(|| WalletMeta::new(wallet_id, user_id));
        if meta.user_id.is_none() {
            meta.user_id = user_id.map(str::to_string);
        }
        update(meta);
        meta.last_updated = now_rfc3339();
    }

    fn lock_metas(&self) -> std::sync::MutexGuard<'_, HashMap<String, WalletMeta>> {
        match self.inner.metas.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_recovering(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        match self.inner.recovering.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// One balance-checked send, shared by the queued and direct paths.
///
/// Syncs to read the available balance, rejects with `insufficientFunds`
/// before sending when it falls short, then submits a single-output
/// transfer allowing sub-minimum amounts.
async fn send_with_balance_check(
    rt: &Arc<dyn VaultRuntime>,
    wallet_id: &str,
    recipient: &str,
    amount_base: u64,
    account_timeout: Duration,
    send_timeout: Duration,
) -> Result<(vaultline_runtime::TransferReceipt, u64), ServiceError> {
    let balance = with_timeout(account_timeout, "sync", rt.sync(wallet_id)).await?;
    let available = balance.available;

    if available < amount_base {
        log::warn!(
            "insufficient balance for wallet {}: {} < {}",
            wallet_id,
            available,
            amount_base
        );
        return Err(ServiceError::InsufficientFunds { need: amount_base, have: available });
    }

    let outputs = [TransferOutput {
        address: recipient.to_string(),
        amount: amount_base,
    }];
    let receipt = with_timeout(send_timeout, "send", rt.send(wallet_id, &outputs, true)).await?;

    Ok((receipt, available))
}

/// First existing address for the account, generating one if none exist.
async fn first_or_generated_address(
    rt: &Arc<dyn VaultRuntime>,
    wallet_id: &str,
    account_timeout: Duration,
) -> Result<String, ServiceError> {
    let addresses =
        with_timeout(account_timeout, "fetch addresses", rt.addresses(wallet_id)).await?;
    if let Some(address) = addresses.into_iter().next() {
        return Ok(address);
    }
    with_timeout(
        account_timeout,
        "generate address",
        rt.generate_address(wallet_id),
    )
    .await
}

/// Wrap a runtime call in its own ceiling so a hang is caught at the most
/// specific level first.
async fn with_timeout<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = Result<T, RuntimeError>>,
) -> Result<T, ServiceError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(ServiceError::from),
        Err(_) => {
            log::error!("{} timed out after {} seconds", what, limit.as_secs());
            Err(ServiceError::Timeout { seconds: limit.as_secs() })
        }
    }
}

fn validate_id(what: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{} must not be empty", what)));
    }
    Ok(())
}

fn generate_mnemonic() -> Result<String, ServiceError> {
    use rand::RngCore;
    let mut entropy = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut entropy);
    let mnemonic = bip39::Mnemonic::from_entropy(&entropy)
        .map_err(|e| ServiceError::AccountManager { message: format!("mnemonic generation failed: {}", e) })?;
    Ok(mnemonic.to_string())
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
