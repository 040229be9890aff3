//! Process secret key providers.

use crate::crypto::EncryptionKey;
use crate::error::KeyError;
use std::path::Path;

/// Source of the stable per-process symmetric key
pub trait SecretKeyProvider: Send + Sync {
    fn process_secret_key(&self) -> EncryptionKey;
}

/// Key held in memory, mostly for tests and embedding
#[derive(Debug, Clone)]
pub struct StaticKeyProvider {
    key: EncryptionKey,
}

impl StaticKeyProvider {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }
}

impl SecretKeyProvider for StaticKeyProvider {
    fn process_secret_key(&self) -> EncryptionKey {
        self.key.clone()
    }
}

/// Key persisted as 32 raw bytes in the data directory.
///
/// The file is created with a random key on first start and read back on
/// every later start, so stored credentials stay decryptable across restarts.
#[derive(Debug)]
pub struct FileKeyProvider {
    key: EncryptionKey,
}

impl FileKeyProvider {
    pub fn load_or_create(path: &Path) -> Result<Self, KeyError> {
        let key = if path.exists() {
            let bytes = std::fs::read(path)?;
            let array: [u8; 32] = bytes.as_slice().try_into().map_err(|_| KeyError::InvalidLength {
                path: path.display().to_string(),
                len: bytes.len(),
            })?;
            EncryptionKey(array)
        } else {
            use rand::RngCore;
            let mut bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut bytes);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, bytes)?;
            tracing::info!(path = %path.display(), "created process secret key");
            EncryptionKey(bytes)
        };
        Ok(Self { key })
    }
}

impl SecretKeyProvider for FileKeyProvider {
    fn process_secret_key(&self) -> EncryptionKey {
        self.key.clone()
    }
}
