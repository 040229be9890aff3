//! Content fingerprints used as optimistic-lock version tokens.
//!
//! A record is rendered as RFC 8785 canonical JSON (sorted keys, fixed number
//! formatting) and hashed with SHA-256, so two records with equal fields
//! always carry the same token no matter how they were built.

use crate::error::{ConfigError, Result};
use crate::record::ConfigRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte SHA-256 digest identifying a record's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    /// Return the fingerprint as a lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a client-supplied token; `None` if it is not 64 hex characters
    pub fn from_hex(token: &str) -> Option<Fingerprint> {
        let bytes = hex::decode(token).ok()?;
        let array: [u8; 32] = bytes.try_into().ok()?;
        Some(Fingerprint(array))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Fingerprint::from_hex(&token)
            .ok_or_else(|| serde::de::Error::custom("version must be 64 hex characters"))
    }
}

/// Canonical JSON bytes of any serializable value
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_jcs::to_vec(value).map_err(|e| ConfigError::Fingerprint(e.to_string()))
}

/// Fingerprint of a record's fields
pub fn fingerprint(record: &ConfigRecord) -> Result<Fingerprint> {
    let bytes = canonical_bytes(record)?;
    let digest = Sha256::digest(&bytes);
    Ok(Fingerprint(digest.into()))
}

/// A record paired with the fingerprint of its content.
///
/// The fields are private so the version can never drift from the record.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedRecord {
    record: ConfigRecord,
    version: Fingerprint,
}

impl VersionedRecord {
    pub fn new(record: ConfigRecord) -> Result<Self> {
        let version = fingerprint(&record)?;
        Ok(Self { record, version })
    }

    pub fn record(&self) -> &ConfigRecord {
        &self.record
    }

    pub fn version(&self) -> Fingerprint {
        self.version
    }

    pub fn into_record(self) -> ConfigRecord {
        self.record
    }
}
