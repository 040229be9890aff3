//! Lumen configuration subsystem: versioned records, optimistic-lock updates,
//! secret lifecycle and access-control invariants

pub mod access;
pub mod crypto;
pub mod dto;
pub mod error;
pub mod fingerprint;
pub mod keys;
pub mod mail;
pub mod record;
pub mod secret;
pub mod service;
pub mod session;
pub mod source;
pub mod store;

pub use error::{ConfigError, KeyError, MailError, Result, SourceError};
pub use fingerprint::{fingerprint, Fingerprint, VersionedRecord};
pub use record::{ConfigDomain, ConfigRecord, PluginDescriptor};
pub use service::{ConfigMutationService, RuntimeStatus, UserInterfaceUpdateOutcome};
pub use store::{ConfigChange, ConfigStore};
