//! Secret field transitions.
//!
//! Secrets never travel back to clients, so every update is partial for
//! secret fields. These resolvers rebuild the stored representation from the
//! prior stored value plus the signal bits the client sends.

use crate::crypto::{encrypt_credential, EncryptionKey, PasswordHasher};
use crate::error::{ConfigError, Result};

/// Intent derived from `(current password, new password)` on an
/// authentication secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSecretIntent<'a> {
    Enable { new: &'a str },
    Disable { proof: &'a str },
    Change { proof: &'a str, new: &'a str },
    /// Both fields empty: no transition can be inferred
    Unspecified,
}

impl<'a> AuthSecretIntent<'a> {
    pub fn from_request(current: &'a str, new: &'a str) -> Self {
        match (current.is_empty(), new.is_empty()) {
            (true, false) => AuthSecretIntent::Enable { new },
            (false, true) => AuthSecretIntent::Disable { proof: current },
            (false, false) => AuthSecretIntent::Change {
                proof: current,
                new,
            },
            (true, true) => AuthSecretIntent::Unspecified,
        }
    }
}

/// Result of an authentication secret transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSecretOutcome {
    /// New stored hash; `None` means disabled
    pub stored: Option<String>,
    /// Whether a current-password proof was checked and matched
    pub proof_verified: bool,
}

/// Resolve the admin password transition.
///
/// | current   | new       | prior    | result                               |
/// |-----------|-----------|----------|--------------------------------------|
/// | empty     | non-empty | disabled | `hash(new)`                          |
/// | empty     | non-empty | enabled  | `SecretAlreadyEnabled`               |
/// | non-empty | empty     | any      | verify proof, then disabled          |
/// | non-empty | non-empty | any      | verify proof, then `hash(new)`       |
/// | empty     | empty     | any      | `MalformedSecretIntent`              |
///
/// A proof never verifies against a disabled secret.
pub fn resolve_auth_secret(
    prior: Option<&str>,
    current: &str,
    new: &str,
    hasher: &PasswordHasher,
) -> Result<AuthSecretOutcome> {
    match AuthSecretIntent::from_request(current, new) {
        AuthSecretIntent::Enable { new } => {
            if prior.is_some() {
                return Err(ConfigError::SecretAlreadyEnabled);
            }
            Ok(AuthSecretOutcome {
                stored: Some(hasher.hash(new)?),
                proof_verified: false,
            })
        }
        AuthSecretIntent::Disable { proof } => {
            verify_proof(prior, proof, hasher)?;
            Ok(AuthSecretOutcome {
                stored: None,
                proof_verified: true,
            })
        }
        AuthSecretIntent::Change { proof, new } => {
            verify_proof(prior, proof, hasher)?;
            Ok(AuthSecretOutcome {
                stored: Some(hasher.hash(new)?),
                proof_verified: true,
            })
        }
        AuthSecretIntent::Unspecified => Err(ConfigError::MalformedSecretIntent(
            "current and new password are both empty".to_string(),
        )),
    }
}

fn verify_proof(prior: Option<&str>, proof: &str, hasher: &PasswordHasher) -> Result<()> {
    match prior {
        Some(hash) if hasher.verify(proof, hash) => Ok(()),
        _ => Err(ConfigError::CurrentSecretIncorrect),
    }
}

/// Resolve the read-only password.
///
/// The read-only password is admin-gated, so no proof is involved:
/// `enabled == false` clears, a non-empty `new` replaces, and an empty `new`
/// keeps whatever hash is stored. Keeping requires something to keep.
pub fn resolve_read_only_secret(
    prior: Option<&str>,
    enabled: bool,
    new: &str,
    hasher: &PasswordHasher,
) -> Result<Option<String>> {
    if !enabled {
        return Ok(None);
    }
    if !new.is_empty() {
        return Ok(Some(hasher.hash(new)?));
    }
    match prior {
        Some(hash) => Ok(Some(hash.to_string())),
        None => Err(ConfigError::MalformedSecretIntent(
            "read-only password enabled without a password".to_string(),
        )),
    }
}

/// Intent derived from `(exists, new plaintext)` on a reversible credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialIntent<'a> {
    Clear,
    Change(&'a str),
    Keep,
}

impl<'a> CredentialIntent<'a> {
    pub fn from_request(exists: bool, new: &'a str) -> Self {
        if !exists {
            CredentialIntent::Clear
        } else if !new.is_empty() {
            CredentialIntent::Change(new)
        } else {
            CredentialIntent::Keep
        }
    }
}

/// Resolve a reversible credential. `Keep` copies the prior ciphertext
/// byte-for-byte.
pub fn resolve_credential(
    prior: Option<&str>,
    exists: bool,
    new: &str,
    process_key: &EncryptionKey,
) -> Result<Option<String>> {
    match CredentialIntent::from_request(exists, new) {
        CredentialIntent::Clear => Ok(None),
        CredentialIntent::Change(plain) => Ok(Some(encrypt_credential(plain, process_key)?)),
        CredentialIntent::Keep => Ok(prior.map(str::to_string)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{decrypt_credential, test_hasher};

    #[derive(Debug, Clone, Copy)]
    enum Prior {
        Disabled,
        Enabled,
    }

    #[derive(Debug, Clone, Copy)]
    enum Proof {
        Empty,
        Wrong,
        Right,
    }

    #[derive(Debug, PartialEq)]
    enum Expected {
        StoredNew { verified: bool },
        Cleared,
        Incorrect,
        AlreadyEnabled,
        Malformed,
    }

    fn expected(prior: Prior, proof: Proof, new_empty: bool) -> Expected {
        use Expected::*;
        match (proof, new_empty, prior) {
            (Proof::Empty, true, _) => Malformed,
            (Proof::Empty, false, Prior::Disabled) => StoredNew { verified: false },
            (Proof::Empty, false, Prior::Enabled) => AlreadyEnabled,
            (Proof::Wrong, _, _) => Incorrect,
            (Proof::Right, _, Prior::Disabled) => Incorrect,
            (Proof::Right, true, Prior::Enabled) => Cleared,
            (Proof::Right, false, Prior::Enabled) => StoredNew { verified: true },
        }
    }

    #[test]
    fn auth_secret_transition_table() {
        let hasher = test_hasher();
        let old_hash = hasher.hash("old").unwrap();
        for prior in [Prior::Disabled, Prior::Enabled] {
            for proof in [Proof::Empty, Proof::Wrong, Proof::Right] {
                for new in ["", "new"] {
                    let prior_hash = match prior {
                        Prior::Disabled => None,
                        Prior::Enabled => Some(old_hash.as_str()),
                    };
                    let current = match proof {
                        Proof::Empty => "",
                        Proof::Wrong => "wrong",
                        Proof::Right => "old",
                    };
                    let got = match resolve_auth_secret(prior_hash, current, new, &hasher) {
                        Ok(AuthSecretOutcome { stored: None, .. }) => Expected::Cleared,
                        Ok(AuthSecretOutcome { stored: Some(h), proof_verified }) => {
                            assert!(hasher.verify("new", &h), "{:?}/{:?}", prior, proof);
                            Expected::StoredNew { verified: proof_verified }
                        }
                        Err(ConfigError::CurrentSecretIncorrect) => Expected::Incorrect,
                        Err(ConfigError::SecretAlreadyEnabled) => Expected::AlreadyEnabled,
                        Err(ConfigError::MalformedSecretIntent(_)) => Expected::Malformed,
                        Err(e) => panic!("unexpected error {e}"),
                    };
                    assert_eq!(
                        got,
                        expected(prior, proof, new.is_empty()),
                        "prior={:?} proof={:?} new={:?}",
                        prior,
                        proof,
                        new
                    );
                }
            }
        }
    }

    #[test]
    fn enable_from_disabled_stores_hash_of_new() {
        let hasher = test_hasher();
        let out = resolve_auth_secret(None, "", "hunter2", &hasher).unwrap();
        let stored = out.stored.unwrap();
        assert!(hasher.verify("hunter2", &stored));
        assert!(!out.proof_verified);
    }

    #[test]
    fn wrong_proof_leaves_nothing_to_apply() {
        let hasher = test_hasher();
        let hash = hasher.hash("old").unwrap();
        let err = resolve_auth_secret(Some(&hash), "wrong", "new", &hasher).unwrap_err();
        assert!(matches!(err, ConfigError::CurrentSecretIncorrect));
    }

    #[test]
    fn intent_classification() {
        assert_eq!(AuthSecretIntent::from_request("", ""), AuthSecretIntent::Unspecified);
        assert_eq!(
            AuthSecretIntent::from_request("a", ""),
            AuthSecretIntent::Disable { proof: "a" }
        );
        assert_eq!(CredentialIntent::from_request(false, "x"), CredentialIntent::Clear);
        assert_eq!(CredentialIntent::from_request(true, "x"), CredentialIntent::Change("x"));
        assert_eq!(CredentialIntent::from_request(true, ""), CredentialIntent::Keep);
    }

    #[test]
    fn read_only_disabled_always_clears() {
        let hasher = test_hasher();
        let hash = hasher.hash("ro").unwrap();
        assert_eq!(resolve_read_only_secret(Some(&hash), false, "", &hasher).unwrap(), None);
        assert_eq!(resolve_read_only_secret(Some(&hash), false, "x", &hasher).unwrap(), None);
        assert_eq!(resolve_read_only_secret(None, false, "", &hasher).unwrap(), None);
    }

    #[test]
    fn read_only_new_value_replaces() {
        let hasher = test_hasher();
        let hash = hasher.hash("ro").unwrap();
        let stored = resolve_read_only_secret(Some(&hash), true, "ro2", &hasher)
            .unwrap()
            .unwrap();
        assert!(hasher.verify("ro2", &stored));
        assert_ne!(stored, hash);
    }

    #[test]
    fn read_only_keep_needs_no_proof() {
        let hasher = test_hasher();
        let hash = hasher.hash("ro").unwrap();
        let stored = resolve_read_only_secret(Some(&hash), true, "", &hasher).unwrap();
        assert_eq!(stored.as_deref(), Some(hash.as_str()));
    }

    #[test]
    fn read_only_keep_with_nothing_stored_is_malformed() {
        let hasher = test_hasher();
        assert!(matches!(
            resolve_read_only_secret(None, true, "", &hasher),
            Err(ConfigError::MalformedSecretIntent(_))
        ));
    }

    #[test]
    fn credential_keep_is_byte_for_byte() {
        let key = EncryptionKey([9u8; 32]);
        let prior = encrypt_credential("mailpw", &key).unwrap();
        let kept = resolve_credential(Some(&prior), true, "", &key).unwrap();
        assert_eq!(kept.as_deref(), Some(prior.as_str()));
    }

    #[test]
    fn credential_clear_and_change() {
        let key = EncryptionKey([9u8; 32]);
        let prior = encrypt_credential("mailpw", &key).unwrap();
        assert_eq!(resolve_credential(Some(&prior), false, "", &key).unwrap(), None);
        assert_eq!(resolve_credential(Some(&prior), false, "ignored", &key).unwrap(), None);
        let changed = resolve_credential(Some(&prior), true, "newpw", &key)
            .unwrap()
            .unwrap();
        assert_ne!(changed, prior);
        assert_eq!(decrypt_credential(&changed, &key).unwrap(), "newpw");
    }

    #[test]
    fn credential_keep_without_prior_stays_absent() {
        let key = EncryptionKey([9u8; 32]);
        assert_eq!(resolve_credential(None, true, "", &key).unwrap(), None);
    }
}
