//! Compare-and-swap configuration store.
//!
//! Each domain lives in its own lock-free cell. Readers take a snapshot
//! without blocking; writers swap in a new snapshot only if the cell still
//! holds the exact snapshot whose version they checked. The set of domains is
//! fixed when the store is opened, so looking up a cell needs no lock either.

use crate::access::AccessState;
use crate::error::{ConfigError, Result};
use crate::fingerprint::{Fingerprint, VersionedRecord};
use crate::record::{ConfigDomain, ConfigRecord, PluginDescriptor};
use crate::source::ConfigSource;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Notification sent after a committed update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    pub domain: ConfigDomain,
    pub version: Fingerprint,
}

pub struct ConfigStore {
    cells: HashMap<ConfigDomain, ArcSwap<VersionedRecord>>,
    source: Arc<dyn ConfigSource>,
    /// Orders writes to the durable source; never held while swapping
    persist_lock: Mutex<()>,
    changes: broadcast::Sender<ConfigChange>,
}

impl ConfigStore {
    /// Load every built-in domain plus one domain per plugin descriptor.
    /// Domains with nothing stored are created from defaults and persisted.
    /// A stored user interface record whose access settings break the access
    /// invariants is refused rather than served.
    pub fn open(source: Arc<dyn ConfigSource>, plugins: &[PluginDescriptor]) -> Result<Self> {
        let mut initial = Vec::with_capacity(ConfigDomain::BUILT_IN.len() + plugins.len());
        for domain in ConfigDomain::BUILT_IN.iter() {
            if let Some(default) = ConfigRecord::default_for(domain) {
                initial.push((domain.clone(), default));
            }
        }
        for descriptor in plugins {
            initial.push((
                ConfigDomain::Plugin(descriptor.id.clone()),
                ConfigRecord::Plugin(descriptor.default_config()),
            ));
        }

        let mut cells = HashMap::with_capacity(initial.len());
        for (domain, default) in initial {
            let record = match source.load(&domain)? {
                Some(loaded) if loaded.domain() == domain => {
                    fill_plugin_defaults(loaded, plugins)
                }
                Some(loaded) => {
                    tracing::warn!(
                        domain = %domain,
                        found = %loaded.domain(),
                        "stored record belongs to another domain, using defaults"
                    );
                    source.persist(&domain, &default)?;
                    default
                }
                None => {
                    tracing::info!(domain = %domain, "creating default configuration");
                    source.persist(&domain, &default)?;
                    default
                }
            };
            if let ConfigRecord::UserInterface(ui) = &record {
                if let Err(e) = AccessState::of(ui).check_invariants() {
                    tracing::error!(domain = %domain, error = %e, "stored access settings are inconsistent");
                    return Err(e);
                }
            }
            let versioned = VersionedRecord::new(record)?;
            cells.insert(domain, ArcSwap::from_pointee(versioned));
        }

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            cells,
            source,
            persist_lock: Mutex::new(()),
            changes,
        })
    }

    fn cell(&self, domain: &ConfigDomain) -> Result<&ArcSwap<VersionedRecord>> {
        self.cells
            .get(domain)
            .ok_or_else(|| ConfigError::UnknownDomain(domain.name()))
    }

    /// All domains, sorted
    pub fn domains(&self) -> Vec<ConfigDomain> {
        let mut domains: Vec<ConfigDomain> = self.cells.keys().cloned().collect();
        domains.sort();
        domains
    }

    /// Immutable snapshot of the current record and its version
    pub fn get(&self, domain: &ConfigDomain) -> Result<Arc<VersionedRecord>> {
        Ok(self.cell(domain)?.load_full())
    }

    /// Replace the record for `domain` if its stored version is `expected`.
    ///
    /// On conflict nothing changes. On success the new snapshot is
    /// persisted and broadcast to subscribers after the swap.
    pub fn compare_and_swap(
        &self,
        domain: &ConfigDomain,
        expected: Fingerprint,
        record: ConfigRecord,
    ) -> Result<Arc<VersionedRecord>> {
        let cell = self.cell(domain)?;
        if record.domain() != *domain {
            return Err(ConfigError::InvalidField {
                field: "domain".to_string(),
                reason: format!("record for {} submitted to {}", record.domain(), domain),
            });
        }
        let candidate = Arc::new(VersionedRecord::new(record)?);

        let current = cell.load_full();
        if current.version() != expected {
            return Err(conflict(domain, expected, current.version()));
        }
        let previous = cell.compare_and_swap(&current, Arc::clone(&candidate));
        if !Arc::ptr_eq(&*previous, &current) {
            return Err(conflict(domain, expected, previous.version()));
        }

        tracing::info!(domain = %domain, version = %candidate.version(), "configuration committed");
        self.persist_current(domain, cell);
        let _ = self.changes.send(ConfigChange {
            domain: domain.clone(),
            version: candidate.version(),
        });
        Ok(candidate)
    }

    fn persist_current(&self, domain: &ConfigDomain, cell: &ArcSwap<VersionedRecord>) {
        let _ordered = self
            .persist_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Re-read under the lock so a slower writer never overwrites a newer snapshot
        let latest = cell.load_full();
        if let Err(e) = self.source.persist(domain, latest.record()) {
            tracing::error!(domain = %domain, error = %e, "failed to persist configuration");
        }
    }

    /// Receive a [`ConfigChange`] for every committed update
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.changes.subscribe()
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("domains", &self.domains())
            .finish_non_exhaustive()
    }
}

fn conflict(domain: &ConfigDomain, expected: Fingerprint, actual: Fingerprint) -> ConfigError {
    ConfigError::VersionConflict {
        domain: domain.clone(),
        expected: expected.to_hex(),
        actual: actual.to_hex(),
    }
}

fn fill_plugin_defaults(record: ConfigRecord, plugins: &[PluginDescriptor]) -> ConfigRecord {
    match record {
        ConfigRecord::Plugin(mut config) => {
            if let Some(descriptor) = plugins.iter().find(|d| d.id == config.id) {
                for property in &descriptor.properties {
                    config
                        .properties
                        .entry(property.name.clone())
                        .or_insert_with(|| property.default.clone());
                }
            }
            ConfigRecord::Plugin(config)
        }
        other => other,
    }
}
