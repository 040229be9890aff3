//! Durable backing for configuration records.

use crate::error::SourceError;
use crate::record::{ConfigDomain, ConfigRecord};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Durable config source consumed by the store
pub trait ConfigSource: Send + Sync {
    fn load(&self, domain: &ConfigDomain) -> Result<Option<ConfigRecord>, SourceError>;
    fn persist(&self, domain: &ConfigDomain, record: &ConfigRecord) -> Result<(), SourceError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory source; nothing survives the process
#[derive(Debug, Default)]
pub struct MemorySource {
    records: Mutex<BTreeMap<String, ConfigRecord>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source pre-populated with records, keyed by their own domain
    pub fn with_records(records: impl IntoIterator<Item = ConfigRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.domain().name(), r))
            .collect();
        Self {
            records: Mutex::new(map),
        }
    }

    pub fn snapshot(&self, domain: &ConfigDomain) -> Option<ConfigRecord> {
        lock(&self.records).get(&domain.name()).cloned()
    }
}

impl ConfigSource for MemorySource {
    fn load(&self, domain: &ConfigDomain) -> Result<Option<ConfigRecord>, SourceError> {
        Ok(self.snapshot(domain))
    }

    fn persist(&self, domain: &ConfigDomain, record: &ConfigRecord) -> Result<(), SourceError> {
        lock(&self.records).insert(domain.name(), record.clone());
        Ok(())
    }
}

/// All records in one JSON document, rewritten atomically on every persist
#[derive(Debug)]
pub struct JsonFileSource {
    path: PathBuf,
    document: Mutex<BTreeMap<String, ConfigRecord>>,
}

impl JsonFileSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let document = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            document: Mutex::new(document),
        })
    }

    fn write_document(&self, document: &BTreeMap<String, ConfigRecord>) -> Result<(), SourceError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, rendered)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ConfigSource for JsonFileSource {
    fn load(&self, domain: &ConfigDomain) -> Result<Option<ConfigRecord>, SourceError> {
        Ok(lock(&self.document).get(&domain.name()).cloned())
    }

    fn persist(&self, domain: &ConfigDomain, record: &ConfigRecord) -> Result<(), SourceError> {
        let mut document = lock(&self.document);
        let previous = document.insert(domain.name(), record.clone());
        if let Err(e) = self.write_document(&document) {
            match previous {
                Some(prev) => document.insert(domain.name(), prev),
                None => document.remove(&domain.name()),
            };
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{GeneralConfig, StorageConfig};
    use tempfile::tempdir;

    #[test]
    fn memory_source_round_trip() {
        let source = MemorySource::new();
        assert!(source.load(&ConfigDomain::General).unwrap().is_none());
        let record = ConfigRecord::General(GeneralConfig::default());
        source.persist(&ConfigDomain::General, &record).unwrap();
        assert_eq!(source.load(&ConfigDomain::General).unwrap(), Some(record));
    }

    #[test]
    fn file_source_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let record = ConfigRecord::Storage(StorageConfig {
            capped_database_size_mb: 42,
            ..StorageConfig::default()
        });
        {
            let source = JsonFileSource::open(&path).unwrap();
            source.persist(&ConfigDomain::Storage, &record).unwrap();
        }
        let reopened = JsonFileSource::open(&path).unwrap();
        assert_eq!(reopened.load(&ConfigDomain::Storage).unwrap(), Some(record));
        assert!(reopened.load(&ConfigDomain::General).unwrap().is_none());
    }

    #[test]
    fn file_source_keeps_other_domains() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let source = JsonFileSource::open(&path).unwrap();
        let general = ConfigRecord::General(GeneralConfig::default());
        let storage = ConfigRecord::Storage(StorageConfig::default());
        source.persist(&ConfigDomain::General, &general).unwrap();
        source.persist(&ConfigDomain::Storage, &storage).unwrap();

        let reopened = JsonFileSource::open(&path).unwrap();
        assert_eq!(reopened.load(&ConfigDomain::General).unwrap(), Some(general));
        assert_eq!(reopened.load(&ConfigDomain::Storage).unwrap(), Some(storage));
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[test]
    fn file_source_rejects_corrupt_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            JsonFileSource::open(&path),
            Err(SourceError::Serialization(_))
        ));
    }

    #[test]
    fn empty_file_is_an_empty_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "").unwrap();
        let source = JsonFileSource::open(&path).unwrap();
        assert!(source.load(&ConfigDomain::Smtp).unwrap().is_none());
    }
}
