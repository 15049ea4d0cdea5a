//! Encrypted key-value storage
//!
//! The session snapshot is the only thing the core keeps between launches.
//! Hosts back this with Keychain or Keystore; `bridge_desktop::EncryptedFileStore`
//! covers desktop builds and tests.

use async_trait::async_trait;

use crate::error::Result;

/// Byte-oriented secure store.
///
/// Values are opaque to the store. Implementations encrypt at rest and never
/// log a value, only its key.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Insert or overwrite `key`.
    async fn write_value(&self, key: &str, value: &[u8]) -> Result<()>;

    /// `Ok(None)` when nothing was written under `key`.
    async fn read_value(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Removing an absent key is not an error.
    async fn remove_value(&self, key: &str) -> Result<()>;

    async fn has_value(&self, key: &str) -> Result<bool> {
        self.read_value(key).await.map(|value| value.is_some())
    }

    async fn keys(&self) -> Result<Vec<String>>;

    /// Drop every entry, e.g. on "delete my data".
    async fn wipe(&self) -> Result<()>;
}
