//! Encrypted file-backed secure storage
//!
//! Each store id owns a single JSON file under the data directory. Values are
//! sealed with AES-256-GCM (random 12-byte nonce prepended to the ciphertext,
//! entry key bound as associated data) and stored base64 encoded.

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const FILE_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    entries: BTreeMap<String, String>,
}

/// Secure store persisting AES-256-GCM sealed values to a per-store file.
///
/// The 256-bit key is derived from the store id and the configured
/// encryption key, so two stores sharing a directory cannot read each other.
pub struct EncryptedFileStore {
    path: PathBuf,
    cipher: Aes256Gcm,
    // Serializes read-modify-write cycles on the backing file.
    io_lock: Mutex<()>,
}

impl EncryptedFileStore {
    /// Open (lazily) the store file for `store_id` inside `dir`.
    pub fn new(dir: impl Into<PathBuf>, store_id: &str, encryption_key: &str) -> Result<Self> {
        if store_id.trim().is_empty() {
            return Err(BridgeError::OperationFailed(
                "store id cannot be empty".to_string(),
            ));
        }
        if encryption_key.is_empty() {
            return Err(BridgeError::OperationFailed(
                "encryption key cannot be empty".to_string(),
            ));
        }

        let file_name = format!("{}.kv.json", sanitize_store_id(store_id));
        let key_bytes = derive_key(store_id, encryption_key);
        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid cipher key: {}", e)))?;

        Ok(Self {
            path: dir.into().join(file_name),
            cipher,
            io_lock: Mutex::new(()),
        })
    }

    /// Open the store in the platform data directory (`<data_local_dir>/storefront`).
    pub fn in_default_dir(store_id: &str, encryption_key: &str) -> Result<Self> {
        let base = dirs::data_local_dir().ok_or_else(|| {
            BridgeError::NotAvailable("No local data directory on this platform".to_string())
        })?;
        Self::new(base.join("storefront"), store_id, encryption_key)
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn seal(&self, key: &str, plaintext: &[u8]) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: key.as_bytes(),
                },
            )
            .map_err(|e| BridgeError::OperationFailed(format!("Encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(sealed))
    }

    fn open(&self, key: &str, encoded: &str) -> Result<Vec<u8>> {
        let sealed = BASE64
            .decode(encoded)
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid stored value: {}", e)))?;

        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(BridgeError::OperationFailed(
                "Invalid stored value: too short".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: key.as_bytes(),
                },
            )
            .map_err(|e| BridgeError::OperationFailed(format!("Decryption failed: {}", e)))
    }

    async fn load(&self) -> Result<StoreFile> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| {
                warn!(path = %self.path.display(), error = %e, "Store file is unreadable");
                BridgeError::OperationFailed(format!("Corrupted store file: {}", e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StoreFile {
                version: FILE_VERSION,
                entries: BTreeMap::new(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, file: &StoreFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let raw = serde_json::to_vec_pretty(file).map_err(|e| {
            BridgeError::OperationFailed(format!("Failed to encode store file: {}", e))
        })?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl fmt::Debug for EncryptedFileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedFileStore")
            .field("path", &self.path)
            .field("cipher", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl SecureStore for EncryptedFileStore {
    async fn write_value(&self, key: &str, value: &[u8]) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        let mut file = self.load().await?;
        let sealed = self.seal(key, value)?;
        file.version = FILE_VERSION;
        file.entries.insert(key.to_string(), sealed);
        self.save(&file).await?;
        debug!(key, "Stored secret");
        Ok(())
    }

    async fn read_value(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let _guard = self.io_lock.lock().await;
        let file = self.load().await?;
        match file.entries.get(key) {
            Some(encoded) => self.open(key, encoded).map(Some),
            None => Ok(None),
        }
    }

    async fn remove_value(&self, key: &str) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        let mut file = self.load().await?;
        if file.entries.remove(key).is_some() {
            self.save(&file).await?;
            debug!(key, "Deleted secret");
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let _guard = self.io_lock.lock().await;
        Ok(self.load().await?.entries.into_keys().collect())
    }

    async fn wipe(&self) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn derive_key(store_id: &str, encryption_key: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(store_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(encryption_key.as_bytes());
    hasher.finalize().into()
}

fn sanitize_store_id(store_id: &str) -> String {
    store_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("storefront-store-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let dir = temp_dir();
        let store = EncryptedFileStore::new(&dir, "storefront", "k3y").unwrap();

        assert_eq!(store.read_value("session").await.unwrap(), None);

        store.write_value("session", b"{\"token\":\"abc\"}").await.unwrap();
        assert_eq!(
            store.read_value("session").await.unwrap(),
            Some(b"{\"token\":\"abc\"}".to_vec())
        );
        assert!(store.has_value("session").await.unwrap());
        assert_eq!(store.keys().await.unwrap(), vec!["session".to_string()]);

        store.remove_value("session").await.unwrap();
        assert_eq!(store.read_value("session").await.unwrap(), None);

        // Deleting a missing key is not an error
        store.remove_value("session").await.unwrap();

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_values_are_encrypted_on_disk() {
        let dir = temp_dir();
        let store = EncryptedFileStore::new(&dir, "storefront", "k3y").unwrap();
        store.write_value("session", b"plain-token-value").await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("plain-token-value"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = temp_dir();
        {
            let store = EncryptedFileStore::new(&dir, "storefront", "k3y").unwrap();
            store.write_value("session", b"persisted").await.unwrap();
        }

        let reopened = EncryptedFileStore::new(&dir, "storefront", "k3y").unwrap();
        assert_eq!(
            reopened.read_value("session").await.unwrap(),
            Some(b"persisted".to_vec())
        );

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_wrong_key_cannot_decrypt() {
        let dir = temp_dir();
        let store = EncryptedFileStore::new(&dir, "storefront", "right").unwrap();
        store.write_value("session", b"secret").await.unwrap();

        let intruder = EncryptedFileStore::new(&dir, "storefront", "wrong").unwrap();
        assert!(intruder.read_value("session").await.is_err());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_store_ids_are_isolated() {
        let dir = temp_dir();
        let a = EncryptedFileStore::new(&dir, "store-a", "k3y").unwrap();
        let b = EncryptedFileStore::new(&dir, "store-b", "k3y").unwrap();

        a.write_value("session", b"a").await.unwrap();
        assert_eq!(b.read_value("session").await.unwrap(), None);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_wipe() {
        let dir = temp_dir();
        let store = EncryptedFileStore::new(&dir, "storefront", "k3y").unwrap();
        store.write_value("one", b"1").await.unwrap();
        store.write_value("two", b"2").await.unwrap();

        store.wipe().await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());

        // Clearing an empty store is fine
        store.wipe().await.unwrap();

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_rejects_empty_configuration() {
        assert!(EncryptedFileStore::new(temp_dir(), "", "k3y").is_err());
        assert!(EncryptedFileStore::new(temp_dir(), "storefront", "").is_err());
    }

    #[test]
    fn test_debug_redacts_cipher() {
        let store = EncryptedFileStore::new(temp_dir(), "storefront", "k3y").unwrap();
        assert!(format!("{:?}", store).contains("REDACTED"));
    }
}
