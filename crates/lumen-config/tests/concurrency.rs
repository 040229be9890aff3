//! Concurrent writers racing on the same domain.

use lumen_config::record::{GeneralConfig, StorageConfig};
use lumen_config::source::MemorySource;
use lumen_config::{ConfigDomain, ConfigError, ConfigRecord, ConfigStore};
use std::sync::{Arc, Barrier};
use std::thread;

const WRITERS: u32 = 16;

fn open_store() -> (Arc<ConfigStore>, Arc<MemorySource>) {
    let source = Arc::new(MemorySource::new());
    let store = Arc::new(ConfigStore::open(source.clone(), &[]).unwrap());
    (store, source)
}

#[test]
fn test_exactly_one_writer_wins() {
    let (store, source) = open_store();
    let observed = store.get(&ConfigDomain::General).unwrap().version();
    let barrier = Arc::new(Barrier::new(WRITERS as usize));

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let candidate = ConfigRecord::General(GeneralConfig {
                    trace_store_threshold_millis: 10_000 + i,
                    ..GeneralConfig::default()
                });
                barrier.wait();
                let result =
                    store.compare_and_swap(&ConfigDomain::General, observed, candidate.clone());
                (candidate, result)
            })
        })
        .collect();

    let mut winners = Vec::new();
    let mut conflicts = 0;
    for handle in handles {
        let (candidate, result) = handle.join().unwrap();
        match result {
            Ok(committed) => winners.push((candidate, committed)),
            Err(ConfigError::VersionConflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, WRITERS - 1);

    let (candidate, committed) = &winners[0];
    let current = store.get(&ConfigDomain::General).unwrap();
    assert_eq!(current.record(), candidate);
    assert_eq!(current.version(), committed.version());
    assert_eq!(source.snapshot(&ConfigDomain::General).as_ref(), Some(candidate));
}

#[test]
fn test_writers_on_different_domains_do_not_interact() {
    let (store, _source) = open_store();
    let general = store.get(&ConfigDomain::General).unwrap().version();
    let storage = store.get(&ConfigDomain::Storage).unwrap().version();

    let a = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            store.compare_and_swap(
                &ConfigDomain::General,
                general,
                ConfigRecord::General(GeneralConfig {
                    enabled: false,
                    ..GeneralConfig::default()
                }),
            )
        })
    };
    let b = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            store.compare_and_swap(
                &ConfigDomain::Storage,
                storage,
                ConfigRecord::Storage(StorageConfig {
                    capped_database_size_mb: 5,
                    ..StorageConfig::default()
                }),
            )
        })
    };

    assert!(a.join().unwrap().is_ok());
    assert!(b.join().unwrap().is_ok());
}

#[test]
fn test_retry_after_conflict_succeeds() {
    let (store, _source) = open_store();
    let observed = store.get(&ConfigDomain::Storage).unwrap().version();
    store
        .compare_and_swap(
            &ConfigDomain::Storage,
            observed,
            ConfigRecord::Storage(StorageConfig {
                gauge_expiration_hours: 1,
                ..StorageConfig::default()
            }),
        )
        .unwrap();

    let stale = store.compare_and_swap(
        &ConfigDomain::Storage,
        observed,
        ConfigRecord::Storage(StorageConfig::default()),
    );
    assert!(matches!(stale, Err(ConfigError::VersionConflict { .. })));

    let refreshed = store.get(&ConfigDomain::Storage).unwrap();
    let retried = store
        .compare_and_swap(
            &ConfigDomain::Storage,
            refreshed.version(),
            ConfigRecord::Storage(StorageConfig::default()),
        )
        .unwrap();
    assert_ne!(retried.version(), refreshed.version());
}
