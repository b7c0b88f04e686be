//! Encrypted secret snapshots.
//!
//! One sealed file per wallet holds the mnemonic and account aliases. The
//! format is self-contained: magic + version + salt + nonce + AES-256-GCM
//! ciphertext, with the key derived from the vault password via
//! HKDF-SHA256.

use crate::error::RuntimeError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fs;
use std::path::{Path, PathBuf};

/// Magic bytes identifying a vaultline snapshot file.
const MAGIC: &[u8; 4] = b"VLSS";

/// Current snapshot format version.
const VERSION: u8 = 1;

/// Header size: 4 (magic) + 1 (version) + 32 (salt) + 12 (nonce) = 49 bytes.
const HEADER_SIZE: usize = 49;

/// HKDF info string binding derived keys to this format.
const KDF_INFO: &[u8] = b"vaultline-snapshot-v1";

/// Decrypted snapshot contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSecrets {
    pub mnemonic: String,
    #[serde(default)]
    pub accounts: Vec<String>,
    /// Number of derived addresses per account alias.
    #[serde(default)]
    pub address_counts: std::collections::BTreeMap<String, u32>,
}

/// A wallet's secret snapshot file.
#[derive(Debug, Clone)]
pub struct SecretSnapshot {
    path: PathBuf,
}

impl SecretSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Conventional snapshot path for a wallet id.
    pub fn path_for(snapshot_dir: &Path, wallet_id: &str) -> PathBuf {
        snapshot_dir.join(format!("{}.snapshot", wallet_id))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Seal secrets to disk under the given password.
    pub fn seal(&self, secrets: &SnapshotSecrets, password: &str) -> Result<(), RuntimeError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let plaintext = serde_json::to_vec(secrets)
            .map_err(|e| RuntimeError::Storage(e.to_string()))?;

        let mut rng = rand::thread_rng();
        let mut salt = [0u8; 32];
        let mut nonce_bytes = [0u8; 12];
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce_bytes);

        let key_bytes = derive_key(password, &salt);
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        let cipher = Aes256Gcm::new(key);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|e| RuntimeError::Crypto(e.to_string()))?;

        let mut output = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        output.extend_from_slice(MAGIC);
        output.push(VERSION);
        output.extend_from_slice(&salt);
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);

        fs::write(&self.path, output)?;
        Ok(())
    }

    /// Open and decrypt the snapshot.
    ///
    /// A missing file is `SnapshotMissing`; a wrong password or corrupted
    /// ciphertext is `Crypto`.
    pub fn open(&self, password: &str) -> Result<SnapshotSecrets, RuntimeError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RuntimeError::SnapshotMissing {
                    path: self.path.display().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        if data.len() < HEADER_SIZE {
            return Err(RuntimeError::Storage("snapshot file too short".into()));
        }
        if &data[0..4] != MAGIC {
            return Err(RuntimeError::Storage("invalid snapshot magic bytes".into()));
        }
        let version = data[4];
        if version != VERSION {
            return Err(RuntimeError::Storage(format!(
                "unsupported snapshot version: {}",
                version
            )));
        }

        let salt = &data[5..37];
        let nonce_bytes = &data[37..49];
        let ciphertext = &data[HEADER_SIZE..];

        let key_bytes = derive_key(password, salt);
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        let cipher = Aes256Gcm::new(key);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| RuntimeError::Crypto("decryption failed (wrong password or corrupted snapshot)".into()))?;

        serde_json::from_slice(&plaintext).map_err(|e| RuntimeError::Storage(e.to_string()))
    }

    /// Remove the snapshot file, tolerating absence.
    pub fn remove(&self) -> Result<(), RuntimeError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn derive_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(salt), password.as_bytes());
    let mut key = [0u8; 32];
    // 32-byte output can never exceed the HKDF limit.
    hk.expand(KDF_INFO, &mut key).expect("32-byte HKDF output");
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets() -> SnapshotSecrets {
        SnapshotSecrets {
            mnemonic: "abandon ability able about above absent absorb abstract".into(),
            accounts: vec!["wallet_1".into()],
            address_counts: Default::default(),
        }
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let snap = SecretSnapshot::new(dir.path().join("w1.snapshot"));
        snap.seal(&secrets(), "hunter2").unwrap();

        let opened = snap.open("hunter2").unwrap();
        assert_eq!(opened.mnemonic, secrets().mnemonic);
        assert_eq!(opened.accounts, vec!["wallet_1".to_string()]);
    }

    #[test]
    fn test_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        let snap = SecretSnapshot::new(dir.path().join("w1.snapshot"));
        snap.seal(&secrets(), "hunter2").unwrap();

        match snap.open("not-the-password") {
            Err(RuntimeError::Crypto(_)) => {}
            other => panic!("expected Crypto error, got {:?}", other.map(|s| s.mnemonic)),
        }
    }

    #[test]
    fn test_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snap = SecretSnapshot::new(dir.path().join("absent.snapshot"));
        assert!(matches!(
            snap.open("pw"),
            Err(RuntimeError::SnapshotMissing { .. })
        ));
    }

    #[test]
    fn test_remove_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let snap = SecretSnapshot::new(dir.path().join("absent.snapshot"));
        snap.remove().unwrap();

        snap.seal(&secrets(), "pw").unwrap();
        assert!(snap.exists());
        snap.remove().unwrap();
        assert!(!snap.exists());
    }
}
