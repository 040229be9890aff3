//! Password hashing (Argon2) and reversible credential encryption
//! (AES-256-GCM with an HKDF-derived purpose key).

use crate::error::{ConfigError, Result};
use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit};
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

const NONCE_LEN: usize = 12;
const CREDENTIAL_KEY_INFO: &[u8] = b"lumen-credential-key";

/// 256-bit (32-byte) process secret key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey(pub [u8; 32]);

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

/// Derive the key used for stored credentials from the process key
pub fn derive_credential_key(process_key: &EncryptionKey) -> Result<EncryptionKey> {
    let hk = Hkdf::<Sha256>::new(None, &process_key.0);
    let mut okm = [0u8; 32];
    hk.expand(CREDENTIAL_KEY_INFO, &mut okm)
        .map_err(|e| ConfigError::Crypto(e.to_string()))?;
    Ok(EncryptionKey(okm))
}

fn random_nonce() -> [u8; NONCE_LEN] {
    use rand::RngCore;
    let mut bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Encrypt a credential. Output is hex of `nonce || ciphertext+tag`.
pub fn encrypt_credential(plaintext: &str, process_key: &EncryptionKey) -> Result<String> {
    let key = derive_credential_key(process_key)?;
    let cipher =
        Aes256Gcm::new_from_slice(&key.0).map_err(|e| ConfigError::Crypto(e.to_string()))?;
    let nonce = random_nonce();
    let ciphertext = cipher
        .encrypt(aes_gcm::Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|e| ConfigError::Crypto(e.to_string()))?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(hex::encode(out))
}

/// Decrypt a credential produced by [`encrypt_credential`]
pub fn decrypt_credential(encoded: &str, process_key: &EncryptionKey) -> Result<String> {
    let bytes = hex::decode(encoded).map_err(|e| ConfigError::Crypto(e.to_string()))?;
    if bytes.len() <= NONCE_LEN {
        return Err(ConfigError::Crypto("ciphertext too short".to_string()));
    }
    let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
    let key = derive_credential_key(process_key)?;
    let cipher =
        Aes256Gcm::new_from_slice(&key.0).map_err(|e| ConfigError::Crypto(e.to_string()))?;
    let plaintext = cipher
        .decrypt(aes_gcm::Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| ConfigError::Crypto("authentication tag mismatch".to_string()))?;
    String::from_utf8(plaintext).map_err(|e| ConfigError::Crypto(e.to_string()))
}

/// One-way hashing for authentication secrets
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Hasher with explicit Argon2id cost parameters
    pub fn with_params(m_cost_kib: u32, t_cost: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(m_cost_kib, t_cost, parallelism, None)
            .map_err(|e| ConfigError::Crypto(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a password into a PHC string with a random salt
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut rand::rngs::OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| ConfigError::Crypto(e.to_string()))
    }

    /// True if `password` matches `hash`. Malformed hashes never verify.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) fn test_hasher() -> PasswordHasher {
    PasswordHasher::with_params(64, 1, 1).unwrap()
}
