//! Wiring of the configuration service, the admin API and the listener.

use crate::api::AdminApi;
use crate::config::{LogFormat, MgmtConfig};
use crate::listener::{self, ListenerControl};
use crate::mail::LogMailTransport;
use anyhow::Context;
use lumen_config::keys::FileKeyProvider;
use lumen_config::record::{ConfigRecord, UserInterfaceConfig};
use lumen_config::session::InMemorySessionManager;
use lumen_config::source::JsonFileSource;
use lumen_config::{ConfigDomain, ConfigMutationService, ConfigStore, RuntimeStatus};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Text => registry.with(fmt::layer()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };
    if let Err(e) = result {
        eprintln!("tracing already initialised: {}", e);
    }
}

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Open the durable store and key in `data_dir` and build the service
pub fn build_service(
    config: &MgmtConfig,
    sessions: Arc<InMemorySessionManager>,
) -> anyhow::Result<Arc<ConfigMutationService>> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
    let source = Arc::new(JsonFileSource::open(&config.config_store_path())?);
    let keys = Arc::new(FileKeyProvider::load_or_create(&config.secret_key_path())?);
    let store = Arc::new(ConfigStore::open(source, &config.plugins)?);

    let timer_wrapper_methods_active = match store.get(&ConfigDomain::Advanced)?.record() {
        ConfigRecord::Advanced(advanced) => advanced.timer_wrapper_methods,
        _ => false,
    };
    let runtime = RuntimeStatus {
        timer_wrapper_methods_active,
        local_server_name: config.local_server_name(),
    };

    Ok(Arc::new(ConfigMutationService::new(
        store,
        keys,
        sessions,
        Arc::new(LogMailTransport),
        config.plugins.clone(),
        runtime,
    )))
}

fn configured_port(service: &ConfigMutationService) -> anyhow::Result<u16> {
    match service.store().get(&ConfigDomain::UserInterface)?.record() {
        ConfigRecord::UserInterface(ui) => Ok(ui.port),
        _ => Ok(UserInterfaceConfig::default().port),
    }
}

/// Idle timeout from the user interface record; `None` when it is 0
fn session_timeout(service: &ConfigMutationService) -> anyhow::Result<Option<Duration>> {
    let minutes = match service.store().get(&ConfigDomain::UserInterface)?.record() {
        ConfigRecord::UserInterface(ui) => ui.session_timeout_minutes,
        _ => UserInterfaceConfig::default().session_timeout_minutes,
    };
    Ok((minutes > 0).then(|| Duration::from_secs(u64::from(minutes) * 60)))
}

/// Spawn a task dropping sessions idle for longer than the configured
/// timeout. The timeout is re-read on every sweep.
pub fn spawn_session_sweeper(
    service: Arc<ConfigMutationService>,
    sessions: Arc<InMemorySessionManager>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match session_timeout(&service) {
                Ok(Some(timeout)) => {
                    let removed = sessions.prune_idle(timeout);
                    if removed > 0 {
                        tracing::debug!(removed, remaining = sessions.session_count(), "idle sessions expired");
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Failed to read session timeout: {}", e),
            }
        }
    })
}

/// Spawn a task logging every committed configuration change
pub fn spawn_audit_log(service: &ConfigMutationService) -> tokio::task::JoinHandle<()> {
    let mut changes = service.store().subscribe();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => {
                    tracing::info!(domain = %change.domain, version = %change.version, "audit: configuration changed")
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "audit log fell behind")
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

pub async fn run(config: MgmtConfig) -> anyhow::Result<()> {
    let sessions = Arc::new(InMemorySessionManager::new());
    let service = build_service(&config, Arc::clone(&sessions))?;
    let port = configured_port(&service)?;
    let addr = SocketAddr::new(config.bind_ip, port);
    let tcp = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    let (control, rebinds) = ListenerControl::new(config.bind_ip, tcp.local_addr()?.port());
    let api = Arc::new(AdminApi::new(Arc::clone(&service), Arc::new(control)));
    let audit = spawn_audit_log(&service);
    let sweeper = spawn_session_sweeper(Arc::clone(&service), sessions, SESSION_SWEEP_INTERVAL);

    tokio::select! {
        result = listener::serve(api.router(), tcp, rebinds) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown requested"),
    }
    audit.abort();
    sweeper.abort();
    Ok(())
}
