//! Error types for the lumen-config subsystem

use crate::record::ConfigDomain;

/// All errors that can occur while reading or mutating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The submitted version token no longer matches the stored record
    #[error("Version conflict on {domain}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Domain the update targeted
        domain: ConfigDomain,
        /// Version the caller last observed
        expected: String,
        /// Version currently stored
        actual: String,
    },
    /// The current-password proof did not verify against the stored hash
    #[error("Current password is incorrect")]
    CurrentSecretIncorrect,
    /// An enable transition was requested for a password that is already set
    #[error("Password is already enabled")]
    SecretAlreadyEnabled,
    /// Candidate access state violates an invariant or lacks re-authentication
    #[error("Invalid access state: {0}")]
    InvalidAccessState(String),
    /// Secret field signals contradict each other
    #[error("Malformed secret intent: {0}")]
    MalformedSecretIntent(String),
    /// A field value is rejected before any mutation happens
    #[error("Invalid value for {field}: {reason}")]
    InvalidField {
        /// Field name as seen by the client
        field: String,
        /// Why the value was rejected
        reason: String,
    },
    /// Domain (or plugin id) does not exist
    #[error("Unknown configuration domain: {0}")]
    UnknownDomain(String),
    /// Canonical serialization of a record failed
    #[error("Fingerprint failed: {0}")]
    Fingerprint(String),
    /// Password hashing, encryption or decryption failed
    #[error("Crypto error: {0}")]
    Crypto(String),
    /// Durable config source failure
    #[error("Config source error: {0}")]
    Source(#[from] SourceError),
    /// Secret key could not be obtained
    #[error("Secret key error: {0}")]
    Key(#[from] KeyError),
    /// Mail transport rejected a message
    #[error("Mail transport error: {0}")]
    Mail(#[from] MailError),
}

/// Errors raised by a durable config source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Stored document could not be parsed or rendered
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by a secret key provider
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Key file exists but has the wrong length
    #[error("Key file {path} has {len} bytes, expected 32")]
    InvalidLength {
        /// Path of the key file
        path: String,
        /// Observed length
        len: usize,
    },
}

/// Errors raised by a mail transport
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// Transport settings are incomplete
    #[error("Mail transport not configured: {0}")]
    NotConfigured(String),
    /// Delivery failed
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, ConfigError>;
