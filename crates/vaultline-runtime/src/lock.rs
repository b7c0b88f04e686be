//! Advisory file locks for the vault's on-disk state.
//!
//! The vault runtime is single-writer at the filesystem level. Every path
//! that touches a wallet's state — the queue drain and the direct transfer
//! path alike — holds that wallet's `FileLock` for the duration. A lock
//! older than `DEFAULT_STALE_AGE` is presumed abandoned and eligible for
//! forced removal.

use crate::error::RuntimeError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Locks older than this are presumed abandoned.
pub const DEFAULT_STALE_AGE: Duration = Duration::from_secs(5 * 60);

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn lock_path(dir: &Path, wallet_id: &str) -> PathBuf {
    dir.join(format!("{}.lock", wallet_id))
}

/// Exclusive per-wallet lock, released on drop.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    released: bool,
}

impl FileLock {
    /// Acquire the lock for `wallet_id`, breaking a stale holder if needed.
    ///
    /// Create-new semantics: if the lock file already exists and is younger
    /// than `stale_after`, acquisition fails with `LockHeld`. A stale file
    /// is forcibly replaced.
    pub fn acquire(
        dir: &Path,
        wallet_id: &str,
        stale_after: Duration,
    ) -> Result<Self, RuntimeError> {
        fs::create_dir_all(dir)?;
        let path = lock_path(dir, wallet_id);

        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                fs::write(&path, now_millis().to_string())?;
                Ok(Self { path, released: false })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let age = lock_age(&path).unwrap_or(Duration::ZERO);
                if age > stale_after {
                    log::warn!(
                        "breaking stale lock for wallet {} ({}ms old)",
                        wallet_id,
                        age.as_millis()
                    );
                    fs::write(&path, now_millis().to_string())?;
                    Ok(Self { path, released: false })
                } else {
                    Err(RuntimeError::LockHeld {
                        wallet_id: wallet_id.to_string(),
                        age_ms: age.as_millis() as u64,
                    })
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Release the lock now instead of waiting for drop.
    pub fn release(mut self) {
        self.remove();
    }

    /// Path of the lock file (for diagnostics).
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn remove(&mut self) {
        if !self.released {
            if let Err(e) = fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("error removing lock file {}: {}", self.path.display(), e);
                }
            }
            self.released = true;
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Age of a lock file, preferring the timestamp written inside it and
/// falling back to filesystem mtime.
pub fn lock_age(path: &Path) -> Option<Duration> {
    if let Ok(contents) = fs::read_to_string(path) {
        if let Ok(created) = contents.trim().parse::<u64>() {
            return Some(Duration::from_millis(now_millis().saturating_sub(created)));
        }
    }
    let meta = fs::metadata(path).ok()?;
    meta.modified().ok()?.elapsed().ok()
}

/// Whether a lock file exists for the wallet.
pub fn marker_exists(dir: &Path, wallet_id: &str) -> bool {
    lock_path(dir, wallet_id).exists()
}

/// Best-effort sweep of abandoned lock files.
///
/// Removes the vault's own `LOCK` file unconditionally and `*.lock` files
/// older than `stale_after`. Fresh wallet locks belong to a live holder and
/// are left alone.
pub fn clean_stale(dir: &Path, stale_after: Duration) {
    sweep(dir, Some(stale_after));
}

/// Unconditional sweep of every lock file in the directory.
///
/// Removes `LOCK` and all `*.lock` files regardless of age. Reserved for
/// the timeout path, where the holder is presumed wedged.
pub fn force_clean(dir: &Path) {
    sweep(dir, None);
}

fn sweep(dir: &Path, stale_after: Option<Duration>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("error reading lock directory {}: {}", dir.display(), e);
            }
            return;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let removable = if name == "LOCK" {
            true
        } else if name.ends_with(".lock") {
            match stale_after {
                None => true,
                Some(stale) => lock_age(&entry.path()).map(|age| age > stale).unwrap_or(true),
            }
        } else {
            false
        };

        if removable {
            if let Err(e) = fs::remove_file(entry.path()) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("error removing lock file {}: {}", name, e);
                }
            } else {
                log::debug!("removed lock file: {}", name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forge_stale_lock(dir: &Path, wallet_id: &str) {
        let stamp = now_millis() - 10 * 60 * 1000;
        fs::write(lock_path(dir, wallet_id), stamp.to_string()).unwrap();
    }

    #[test]
    fn test_acquire_and_release_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let lock = FileLock::acquire(dir.path(), "w1", DEFAULT_STALE_AGE).unwrap();
            assert!(lock.path().exists());
        }
        assert!(!marker_exists(dir.path(), "w1"));
    }

    #[test]
    fn test_contention_while_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let _held = FileLock::acquire(dir.path(), "w1", DEFAULT_STALE_AGE).unwrap();
        let err = FileLock::acquire(dir.path(), "w1", DEFAULT_STALE_AGE).unwrap_err();
        assert!(err.is_lock_contention());
    }

    #[test]
    fn test_stale_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        forge_stale_lock(dir.path(), "w1");

        let lock = FileLock::acquire(dir.path(), "w1", DEFAULT_STALE_AGE).unwrap();
        assert!(lock.path().exists());
    }

    #[test]
    fn test_independent_wallets_do_not_contend() {
        let dir = tempfile::tempdir().unwrap();
        let _a = FileLock::acquire(dir.path(), "w1", DEFAULT_STALE_AGE).unwrap();
        let _b = FileLock::acquire(dir.path(), "w2", DEFAULT_STALE_AGE).unwrap();
    }

    #[test]
    fn test_clean_stale_keeps_fresh_locks() {
        let dir = tempfile::tempdir().unwrap();
        let held = FileLock::acquire(dir.path(), "fresh", DEFAULT_STALE_AGE).unwrap();
        forge_stale_lock(dir.path(), "abandoned");
        fs::write(dir.path().join("LOCK"), "x").unwrap();
        fs::write(dir.path().join("data.db"), "x").unwrap();

        clean_stale(dir.path(), DEFAULT_STALE_AGE);
        assert!(held.path().exists(), "fresh lock must survive the sweep");
        assert!(!marker_exists(dir.path(), "abandoned"));
        assert!(!dir.path().join("LOCK").exists());
        assert!(dir.path().join("data.db").exists());
    }

    #[test]
    fn test_force_clean_sweeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let held = FileLock::acquire(dir.path(), "fresh", DEFAULT_STALE_AGE).unwrap();
        fs::write(dir.path().join("LOCK"), "x").unwrap();

        force_clean(dir.path());
        assert!(!held.path().exists());
        assert!(!dir.path().join("LOCK").exists());
    }

    #[test]
    fn test_sweeps_tolerate_missing_dir() {
        clean_stale(Path::new("/nonexistent/vaultline-test"), DEFAULT_STALE_AGE);
        force_clean(Path::new("/nonexistent/vaultline-test"));
    }
}
