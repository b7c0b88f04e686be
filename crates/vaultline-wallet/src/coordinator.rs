//! The wallet operation coordinator.
//!
//! The vault's on-disk state is single-writer, so every vault-touching call
//! in the process funnels through one coordinator: a global FIFO queue
//! drained strictly one operation at a time regardless of target wallet,
//! with a per-operation timeout, the wallet's file lock held across each
//! operation, and a per-wallet handle cache that is populated lazily and
//! evicted on lock/timeout-class failures.
//!
//! A queued operation settles exactly once. The only cancellation path is
//! the internal timeout; an external call already in flight cannot be
//! aborted, so a transfer may still complete on the ledger after the caller
//! has seen a timeout.

use crate::error::ServiceError;
use rand::Rng;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{oneshot, Mutex, Notify};
use vaultline_runtime::{lock, FileLock, RuntimeProvider, VaultRuntime};

/// Coordinator tuning knobs.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Directory holding lock files (shared with the vault database root).
    pub lock_dir: PathBuf,
    /// Ceiling for one queued operation, enqueue to settle.
    pub operation_timeout: Duration,
    /// Delay between drain iterations.
    pub queue_poll_delay: Duration,
    /// Settle delay before constructing a new handle.
    pub construct_settle_delay: Duration,
    /// Backoff before the single construction retry.
    pub construct_retry_delay: Duration,
    /// Backoff before the single handle re-acquisition retry in the drain.
    pub acquire_retry_delay: Duration,
    /// Locks older than this are presumed abandoned.
    pub stale_lock_age: Duration,
}

impl CoordinatorConfig {
    pub fn new(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_dir: lock_dir.into(),
            operation_timeout: Duration::from_secs(120),
            queue_poll_delay: Duration::from_millis(200),
            construct_settle_delay: Duration::from_millis(100),
            construct_retry_delay: Duration::from_millis(300),
            acquire_retry_delay: Duration::from_millis(500),
            stale_lock_age: lock::DEFAULT_STALE_AGE,
        }
    }
}

type AnyResult = Result<Box<dyn Any + Send>, ServiceError>;
type OpFuture = Pin<Box<dyn Future<Output = AnyResult> + Send>>;
type BoxedOp = Box<dyn FnOnce(Arc<dyn VaultRuntime>) -> OpFuture + Send>;

/// One enqueued operation. Settles exactly once via `reply`.
struct PendingOperation {
    wallet_id: String,
    operation_id: String,
    op: BoxedOp,
    reply: oneshot::Sender<AnyResult>,
}

struct CoordinatorInner {
    config: CoordinatorConfig,
    provider: Arc<dyn RuntimeProvider>,
    /// Handle cache: at most one handle per wallet id, inserted only on
    /// successful construction. The lock is held across construction so
    /// concurrent callers cannot construct twice.
    handles: Mutex<HashMap<String, Arc<dyn VaultRuntime>>>,
    queue: StdMutex<VecDeque<PendingOperation>>,
    notify: Notify,
}

/// Serializes every vault operation in the process.
///
/// Constructed once and injected into consumers; tests build independent
/// instances with their own providers and lock directories.
#[derive(Clone)]
pub struct WalletCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl WalletCoordinator {
    /// Create the coordinator and spawn its drain task.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(provider: Arc<dyn RuntimeProvider>, config: CoordinatorConfig) -> Self {
        let inner = Arc::new(CoordinatorInner {
            config,
            provider,
            handles: Mutex::new(HashMap::new()),
            queue: StdMutex::new(VecDeque::new()),
            notify: Notify::new(),
        });

        let drain = inner.clone();
        tokio::spawn(async move { drain.drain_loop().await });

        Self { inner }
    }

    /// Directory holding the lock files.
    pub fn lock_dir(&self) -> &Path {
        &self.inner.config.lock_dir
    }

    /// Staleness threshold for lock files.
    pub fn stale_lock_age(&self) -> Duration {
        self.inner.config.stale_lock_age
    }

    /// Enqueue an operation for a wallet and await its result.
    ///
    /// Operations run strictly in submission order across all wallets. If
    /// the operation has not settled within the configured ceiling, lock
    /// files are force-cleaned, the entry is removed if still queued, and
    /// the caller gets a timeout error; the operation body itself cannot be
    /// aborted once started.
    pub async fn execute<T, F, Fut>(&self, wallet_id: &str, op: F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn VaultRuntime>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ServiceError>> + Send + 'static,
    {
        let operation_id = format!(
            "{}_{}_{}",
            wallet_id,
            now_millis(),
            rand::thread_rng().gen_range(0..1000)
        );
        log::debug!("starting operation {} for wallet {}", operation_id, wallet_id);

        let (reply_tx, reply_rx) = oneshot::channel();
        let boxed: BoxedOp = Box::new(move |rt| {
            Box::pin(async move {
                op(rt).await.map(|v| Box::new(v) as Box<dyn Any + Send>)
            })
        });

        self.inner.enqueue(PendingOperation {
            wallet_id: wallet_id.to_string(),
            operation_id: operation_id.clone(),
            op: boxed,
            reply: reply_tx,
        });

        let timeout = self.inner.config.operation_timeout;
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => {
                match result {
                    Ok(value) => match value.downcast::<T>() {
                        Ok(v) => {
                            log::debug!("operation {} completed successfully", operation_id);
                            Ok(*v)
                        }
                        Err(_) => Err(ServiceError::AccountManager {
                            message: "operation result type mismatch".into(),
                        }),
                    },
                    Err(e) => {
                        log::debug!("operation {} failed: {}", operation_id, e);
                        Err(e)
                    }
                }
            }
            Ok(Err(_dropped)) => Err(ServiceError::AccountManager {
                message: "operation dropped before completion".into(),
            }),
            Err(_elapsed) => {
                log::error!(
                    "operation {} timed out after {} seconds",
                    operation_id,
                    timeout.as_secs()
                );
                lock::force_clean(&self.inner.config.lock_dir);
                self.inner.remove_queued(&operation_id);
                Err(ServiceError::Timeout { seconds: timeout.as_secs() })
            }
        }
    }

    /// Cached handle for a wallet, constructing one if needed.
    ///
    /// Locks are force-cleaned before construction; a failed construction
    /// is retried once after a backoff. The cache is only written on
    /// success, and the cache lock is held across construction so two
    /// concurrent calls for the same wallet id construct exactly once.
    pub async fn get_or_create(
        &self,
        wallet_id: &str,
    ) -> Result<Arc<dyn VaultRuntime>, ServiceError> {
        self.inner.get_or_create(wallet_id).await
    }

    /// Drop the cached handle for a wallet, if any.
    pub async fn evict(&self, wallet_id: &str) {
        if self.inner.handles.lock().await.remove(wallet_id).is_some() {
            log::debug!("evicted cached handle for wallet {}", wallet_id);
        }
    }

    /// Whether a handle is currently cached for the wallet.
    pub async fn is_cached(&self, wallet_id: &str) -> bool {
        self.inner.handles.lock().await.contains_key(wallet_id)
    }

    /// Number of operations waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.inner.lock_queue().len()
    }
}

impl CoordinatorInner {
    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<PendingOperation>> {
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn enqueue(&self, pending: PendingOperation) {
        self.lock_queue().push_back(pending);
        self.notify.notify_one();
    }

    fn remove_queued(&self, operation_id: &str) {
        self.lock_queue().retain(|p| p.operation_id != operation_id);
    }

    async fn get_or_create(&self, wallet_id: &str) -> Result<Arc<dyn VaultRuntime>, ServiceError> {
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get(wallet_id) {
            log::debug!("using cached handle for wallet {}", wallet_id);
            return Ok(handle.clone());
        }

        // Clean abandoned lock files before constructing, then give any
        // pending filesystem activity a moment to settle.
        lock::clean_stale(&self.config.lock_dir, self.config.stale_lock_age);
        tokio::time::sleep(self.config.construct_settle_delay).await;

        let handle = match self.provider.open(wallet_id).await {
            Ok(handle) => handle,
            Err(first_err) => {
                log::warn!(
                    "handle construction failed for wallet {}: {} (retrying once)",
                    wallet_id,
                    first_err
                );
                lock::clean_stale(&self.config.lock_dir, self.config.stale_lock_age);
                tokio::time::sleep(self.config.construct_retry_delay).await;
                self.provider.open(wallet_id).await.map_err(|retry_err| {
                    log::error!(
                        "handle construction retry failed for wallet {}: {}",
                        wallet_id,
                        retry_err
                    );
                    ServiceError::from(retry_err)
                })?
            }
        };

        handles.insert(wallet_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Single drain task: pop the head, process it to settlement, repeat.
    async fn drain_loop(self: Arc<Self>) {
        loop {
            let pending = self.lock_queue().pop_front();
            let Some(pending) = pending else {
                self.notify.notified().await;
                continue;
            };

            self.process(pending).await;

            // Small delay between iterations so the drain never spins.
            tokio::time::sleep(self.config.queue_poll_delay).await;
        }
    }

    async fn process(&self, pending: PendingOperation) {
        let PendingOperation { wallet_id, operation_id, op, reply } = pending;
        log::debug!("processing operation {} for wallet {}", operation_id, wallet_id);

        // Hold the wallet's exclusive lock across the whole operation. A
        // direct transfer holding it delays the drain until it releases.
        let guard = self.acquire_wallet_lock(&wallet_id).await;

        // Obtain the handle, with one aggressive cleanup-and-retry pass.
        let handle = match self.get_or_create(&wallet_id).await {
            Ok(handle) => handle,
            Err(first_err) => {
                log::warn!(
                    "error getting handle for operation {}: {} (cleaning up and retrying)",
                    operation_id,
                    first_err
                );
                self.handles.lock().await.remove(&wallet_id);
                tokio::time::sleep(self.config.acquire_retry_delay).await;

                match self.get_or_create(&wallet_id).await {
                    Ok(handle) => handle,
                    Err(err) => {
                        drop(guard);
                        let evict = err.is_lock_or_timeout();
                        let _ = reply.send(Err(err));
                        if evict {
                            self.handles.lock().await.remove(&wallet_id);
                        }
                        return;
                    }
                }
            }
        };

        let result = op(handle).await;

        drop(guard);

        let failed_on_lock_or_timeout =
            result.as_ref().err().map(|e| e.is_lock_or_timeout()).unwrap_or(false);
        if let Err(e) = &result {
            log::error!("error in operation {}: {}", operation_id, e);
        }

        let _ = reply.send(result);

        if failed_on_lock_or_timeout {
            log::warn!(
                "removing handle for wallet {} after lock/timeout failure",
                wallet_id
            );
            lock::clean_stale(&self.config.lock_dir, self.config.stale_lock_age);
            self.handles.lock().await.remove(&wallet_id);
        }
    }

    /// Acquire the wallet's file lock, waiting out a live holder.
    ///
    /// Contention means another path (a direct transfer, or another
    /// process) is mid-operation; the drain waits rather than stomping the
    /// lock. Stale locks are broken by the acquire itself. Lock-directory
    /// I/O failures degrade to running unlocked, matching the best-effort
    /// contract.
    async fn acquire_wallet_lock(&self, wallet_id: &str) -> Option<FileLock> {
        loop {
            match FileLock::acquire(&self.config.lock_dir, wallet_id, self.config.stale_lock_age) {
                Ok(guard) => return Some(guard),
                Err(e) if e.is_lock_contention() => {
                    log::debug!("wallet {} is locked, drain waiting: {}", wallet_id, e);
                    tokio::time::sleep(self.config.acquire_retry_delay).await;
                }
                Err(e) => {
                    log::warn!(
                        "error acquiring lock for wallet {}: {} (continuing unlocked)",
                        wallet_id,
                        e
                    );
                    return None;
                }
            }
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
