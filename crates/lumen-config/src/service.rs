//! Per-domain read and update operations.
//!
//! Every update follows the same shape: read the current snapshot, fail fast
//! on a stale version, build the candidate (plain fields, then secrets, then
//! access validation), and hand it to the store's compare-and-swap. Side
//! effects only run once the swap has committed.

use crate::access::{validate_access, AccessState};
use crate::crypto::{decrypt_credential, PasswordHasher};
use crate::dto::*;
use crate::error::{ConfigError, Result};
use crate::fingerprint::{Fingerprint, VersionedRecord};
use crate::keys::SecretKeyProvider;
use crate::mail::{MailMessage, MailTransport, SmtpSettings};
use crate::record::*;
use crate::secret::{resolve_auth_secret, resolve_credential, resolve_read_only_secret, CredentialIntent};
use crate::session::{SessionManager, SessionToken};
use crate::store::ConfigStore;
use std::sync::Arc;

const DEFAULT_FROM_DISPLAY_NAME: &str = "Lumen";
const TEST_MESSAGE_SUBJECT: &str = "Test email from Lumen (EOM)";

/// Facts about the running process that views report next to stored config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeStatus {
    /// Whether timer wrapper methods were enabled when the process started
    pub timer_wrapper_methods_active: bool,
    pub local_server_name: String,
}

/// Result of a committed access/UI update
#[derive(Debug, Clone, PartialEq)]
pub struct UserInterfaceUpdateOutcome {
    pub view: UserInterfaceView,
    /// Authenticated session created because the admin password was enabled
    pub session: Option<SessionToken>,
    pub sessions_invalidated: bool,
    pub prior_port: u16,
    pub port: u16,
}

impl UserInterfaceUpdateOutcome {
    pub fn port_changed(&self) -> bool {
        self.prior_port != self.port
    }
}

/// Typed access to one variant of [`ConfigRecord`]
trait DomainRecord: Clone {
    fn from_record(record: &ConfigRecord) -> Option<&Self>;
    fn into_record(self) -> ConfigRecord;
}

macro_rules! domain_record {
    ($ty:ty, $variant:ident) => {
        impl DomainRecord for $ty {
            fn from_record(record: &ConfigRecord) -> Option<&Self> {
                match record {
                    ConfigRecord::$variant(config) => Some(config),
                    _ => None,
                }
            }

            fn into_record(self) -> ConfigRecord {
                ConfigRecord::$variant(self)
            }
        }
    };
}

domain_record!(GeneralConfig, General);
domain_record!(UserInterfaceConfig, UserInterface);
domain_record!(StorageConfig, Storage);
domain_record!(SmtpConfig, Smtp);
domain_record!(UserRecordingConfig, UserRecording);
domain_record!(AdvancedConfig, Advanced);
domain_record!(PluginConfig, Plugin);

struct Committed<T> {
    prior: T,
    current: T,
    version: Fingerprint,
}

fn typed<'a, T: DomainRecord>(domain: &ConfigDomain, snapshot: &'a VersionedRecord) -> Result<&'a T> {
    T::from_record(snapshot.record()).ok_or_else(|| ConfigError::UnknownDomain(domain.name()))
}

fn set<T>(target: &mut T, value: &Option<T>)
where
    T: Clone,
{
    if let Some(value) = value {
        *target = value.clone();
    }
}

pub struct ConfigMutationService {
    store: Arc<ConfigStore>,
    keys: Arc<dyn SecretKeyProvider>,
    hasher: PasswordHasher,
    sessions: Arc<dyn SessionManager>,
    mail: Arc<dyn MailTransport>,
    plugins: Vec<PluginDescriptor>,
    runtime: RuntimeStatus,
}

impl ConfigMutationService {
    pub fn new(
        store: Arc<ConfigStore>,
        keys: Arc<dyn SecretKeyProvider>,
        sessions: Arc<dyn SessionManager>,
        mail: Arc<dyn MailTransport>,
        plugins: Vec<PluginDescriptor>,
        runtime: RuntimeStatus,
    ) -> Self {
        Self {
            store,
            keys,
            hasher: PasswordHasher::new(),
            sessions,
            mail,
            plugins,
            runtime,
        }
    }

    /// Replace the password hasher, e.g. with cheaper parameters
    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn runtime(&self) -> &RuntimeStatus {
        &self.runtime
    }

    fn load<T: DomainRecord>(&self, domain: &ConfigDomain) -> Result<(T, Fingerprint)> {
        let snapshot = self.store.get(domain)?;
        let config = typed::<T>(domain, &snapshot)?.clone();
        tracing::debug!(domain = %domain, version = %snapshot.version(), "configuration read");
        Ok((config, snapshot.version()))
    }

    fn mutate<T, F>(&self, domain: &ConfigDomain, expected: Fingerprint, build: F) -> Result<Committed<T>>
    where
        T: DomainRecord,
        F: FnOnce(&T) -> Result<T>,
    {
        let result = self.try_mutate(domain, expected, build);
        if let Err(e) = &result {
            tracing::warn!(domain = %domain, error = %e, "configuration update rejected");
        }
        result
    }

    fn try_mutate<T, F>(&self, domain: &ConfigDomain, expected: Fingerprint, build: F) -> Result<Committed<T>>
    where
        T: DomainRecord,
        F: FnOnce(&T) -> Result<T>,
    {
        let snapshot = self.store.get(domain)?;
        if snapshot.version() != expected {
            return Err(ConfigError::VersionConflict {
                domain: domain.clone(),
                expected: expected.to_hex(),
                actual: snapshot.version().to_hex(),
            });
        }
        let prior = typed::<T>(domain, &snapshot)?;
        let candidate = build(prior)?;
        let committed = self
            .store
            .compare_and_swap(domain, expected, candidate.into_record())?;
        Ok(Committed {
            prior: prior.clone(),
            current: typed::<T>(domain, &committed)?.clone(),
            version: committed.version(),
        })
    }

    fn descriptor(&self, id: &str) -> Result<&PluginDescriptor> {
        self.plugins
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| ConfigError::UnknownDomain(ConfigDomain::Plugin(id.to_string()).name()))
    }

    pub fn get_general(&self) -> Result<VersionedView<GeneralConfig>> {
        let (config, version) = self.load(&ConfigDomain::General)?;
        Ok(VersionedView { config, version })
    }

    pub fn update_general(&self, update: &GeneralUpdate) -> Result<VersionedView<GeneralConfig>> {
        let committed = self.mutate(&ConfigDomain::General, update.version, |prior: &GeneralConfig| {
            let mut candidate = prior.clone();
            set(&mut candidate.enabled, &update.enabled);
            set(&mut candidate.trace_store_threshold_millis, &update.trace_store_threshold_millis);
            set(&mut candidate.profiling_interval_millis, &update.profiling_interval_millis);
            set(&mut candidate.default_transaction_type, &update.default_transaction_type);
            Ok(candidate)
        })?;
        Ok(VersionedView {
            config: committed.current,
            version: committed.version,
        })
    }

    pub fn get_user_interface(&self, status: ServerStatus) -> Result<UserInterfaceResponse> {
        let (config, version) = self.load::<UserInterfaceConfig>(&ConfigDomain::UserInterface)?;
        Ok(UserInterfaceResponse::new(
            UserInterfaceView::new(&config, version),
            status,
        ))
    }

    /// Update the access/UI domain.
    ///
    /// Enabling the admin password hands back a fresh authenticated session
    /// for the caller; disabling it invalidates every session.
    pub fn update_user_interface(
        &self,
        update: &UserInterfaceUpdate,
    ) -> Result<UserInterfaceUpdateOutcome> {
        let committed = self.mutate(
            &ConfigDomain::UserInterface,
            update.version,
            |prior: &UserInterfaceConfig| self.build_user_interface(prior, update),
        )?;

        let was_enabled = committed.prior.admin_password_enabled();
        let now_enabled = committed.current.admin_password_enabled();
        let session = if !was_enabled && now_enabled {
            let token = self.sessions.create_session(true);
            tracing::info!("admin password enabled, session established");
            Some(token)
        } else {
            None
        };
        let sessions_invalidated = was_enabled && !now_enabled;
        if sessions_invalidated {
            self.sessions.invalidate_all_sessions();
            tracing::info!("admin password disabled, sessions invalidated");
        }

        Ok(UserInterfaceUpdateOutcome {
            view: UserInterfaceView::new(&committed.current, committed.version),
            session,
            sessions_invalidated,
            prior_port: committed.prior.port,
            port: committed.current.port,
        })
    }

    fn build_user_interface(
        &self,
        prior: &UserInterfaceConfig,
        update: &UserInterfaceUpdate,
    ) -> Result<UserInterfaceConfig> {
        let mut candidate = prior.clone();
        if update.port == Some(0) {
            return Err(ConfigError::InvalidField {
                field: "port".to_string(),
                reason: "port must be between 1 and 65535".to_string(),
            });
        }
        set(&mut candidate.port, &update.port);
        set(&mut candidate.session_timeout_minutes, &update.session_timeout_minutes);
        set(&mut candidate.anonymous_access, &update.anonymous_access);

        let mut admin_proof_verified = false;
        if !update.current_admin_password.is_empty() || !update.new_admin_password.is_empty() {
            let outcome = resolve_auth_secret(
                prior.admin_password_hash.as_deref(),
                &update.current_admin_password,
                &update.new_admin_password,
                &self.hasher,
            )?;
            candidate.admin_password_hash = outcome.stored;
            admin_proof_verified = outcome.proof_verified;
        }

        // A new read-only password without the flag implies enabling it
        let read_only_enabled = update
            .read_only_password_enabled
            .or_else(|| (!update.new_read_only_password.is_empty()).then_some(true));
        if let Some(enabled) = read_only_enabled {
            candidate.read_only_password_hash = resolve_read_only_secret(
                prior.read_only_password_hash.as_deref(),
                enabled,
                &update.new_read_only_password,
                &self.hasher,
            )?;
        }

        validate_access(
            &AccessState::of(&candidate),
            &AccessState::of(prior),
            admin_proof_verified,
        )?;
        Ok(candidate)
    }

    pub fn get_storage(&self) -> Result<VersionedView<StorageConfig>> {
        let (config, version) = self.load(&ConfigDomain::Storage)?;
        Ok(VersionedView { config, version })
    }

    pub fn update_storage(&self, update: &StorageUpdate) -> Result<VersionedView<StorageConfig>> {
        let committed = self.mutate(&ConfigDomain::Storage, update.version, |prior: &StorageConfig| {
            let mut candidate = prior.clone();
            set(&mut candidate.aggregate_expiration_hours, &update.aggregate_expiration_hours);
            set(&mut candidate.trace_expiration_hours, &update.trace_expiration_hours);
            set(&mut candidate.gauge_expiration_hours, &update.gauge_expiration_hours);
            set(&mut candidate.capped_database_size_mb, &update.capped_database_size_mb);
            Ok(candidate)
        })?;
        Ok(VersionedView {
            config: committed.current,
            version: committed.version,
        })
    }

    pub fn get_smtp(&self) -> Result<SmtpResponse> {
        let (config, version) = self.load::<SmtpConfig>(&ConfigDomain::Smtp)?;
        Ok(self.smtp_response(&config, version))
    }

    fn smtp_response(&self, config: &SmtpConfig, version: Fingerprint) -> SmtpResponse {
        SmtpResponse {
            config: SmtpView::new(config, version),
            local_server_name: self.runtime.local_server_name.clone(),
        }
    }

    pub fn update_smtp(&self, update: &SmtpUpdate) -> Result<SmtpResponse> {
        let committed = self.mutate(&ConfigDomain::Smtp, update.version, |prior: &SmtpConfig| {
            let mut candidate = merge_smtp_fields(prior, update);
            let exists = update.password_exists.unwrap_or_else(|| prior.password_exists());
            candidate.encrypted_password = resolve_credential(
                prior.encrypted_password.as_deref(),
                exists,
                &update.new_password,
                &self.keys.process_secret_key(),
            )?;
            Ok(candidate)
        })?;
        Ok(self.smtp_response(&committed.current, committed.version))
    }

    /// Send a test message using a candidate mail configuration.
    ///
    /// Nothing is stored. A kept password is read from the stored record.
    pub async fn send_test_message(&self, request: &SendTestEmailRequest) -> Result<()> {
        let recipient = request
            .test_email_recipient
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| ConfigError::InvalidField {
                field: "test_email_recipient".to_string(),
                reason: "a recipient is required".to_string(),
            })?;

        let (stored, _) = self.load::<SmtpConfig>(&ConfigDomain::Smtp)?;
        let candidate = merge_smtp_fields(&stored, &request.config);
        let exists = request
            .config
            .password_exists
            .unwrap_or_else(|| stored.password_exists());
        let password = match CredentialIntent::from_request(exists, &request.config.new_password) {
            CredentialIntent::Clear => None,
            CredentialIntent::Change(plain) => Some(plain.to_string()),
            CredentialIntent::Keep => match stored.encrypted_password.as_deref() {
                Some(ciphertext) => Some(decrypt_credential(
                    ciphertext,
                    &self.keys.process_secret_key(),
                )?),
                None => None,
            },
        };

        let settings = SmtpSettings {
            host: candidate.host.clone(),
            port: candidate.port,
            ssl: candidate.ssl,
            username: candidate.username.clone(),
            password,
            additional_properties: candidate.additional_properties.clone(),
        };
        let message = MailMessage {
            from_address: if candidate.from_email_address.is_empty() {
                format!("lumen@{}", self.runtime.local_server_name)
            } else {
                candidate.from_email_address.clone()
            },
            from_display_name: if candidate.from_display_name.is_empty() {
                DEFAULT_FROM_DISPLAY_NAME.to_string()
            } else {
                candidate.from_display_name.clone()
            },
            to: recipient.to_string(),
            subject: TEST_MESSAGE_SUBJECT.to_string(),
            body: String::new(),
        };

        match self.mail.send(&settings, &message).await {
            Ok(()) => {
                tracing::info!(to = %message.to, host = %settings.host, "test email sent");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(to = %message.to, error = %e, "test email failed");
                Err(e.into())
            }
        }
    }

    pub fn get_user_recording(&self) -> Result<VersionedView<UserRecordingConfig>> {
        let (config, version) = self.load(&ConfigDomain::UserRecording)?;
        Ok(VersionedView { config, version })
    }

    pub fn update_user_recording(
        &self,
        update: &UserRecordingUpdate,
    ) -> Result<VersionedView<UserRecordingConfig>> {
        let committed = self.mutate(
            &ConfigDomain::UserRecording,
            update.version,
            |prior: &UserRecordingConfig| {
                let mut candidate = prior.clone();
                set(&mut candidate.enabled, &update.enabled);
                set(&mut candidate.user, &update.user);
                set(&mut candidate.profile_interval_millis, &update.profile_interval_millis);
                Ok(candidate)
            },
        )?;
        Ok(VersionedView {
            config: committed.current,
            version: committed.version,
        })
    }

    pub fn get_advanced(&self) -> Result<AdvancedResponse<AdvancedConfig>> {
        let (config, version) = self.load(&ConfigDomain::Advanced)?;
        Ok(AdvancedResponse {
            config: VersionedView { config, version },
            timer_wrapper_methods_active: self.runtime.timer_wrapper_methods_active,
        })
    }

    pub fn update_advanced(&self, update: &AdvancedUpdate) -> Result<AdvancedResponse<AdvancedConfig>> {
        let committed = self.mutate(&ConfigDomain::Advanced, update.version, |prior: &AdvancedConfig| {
            let mut c = prior.clone();
            set(&mut c.timer_wrapper_methods, &update.timer_wrapper_methods);
            set(&mut c.weaving_timer, &update.weaving_timer);
            set(
                &mut c.immediate_partial_store_threshold_seconds,
                &update.immediate_partial_store_threshold_seconds,
            );
            set(
                &mut c.max_aggregate_queries_per_query_type,
                &update.max_aggregate_queries_per_query_type,
            );
            set(
                &mut c.max_trace_entries_per_transaction,
                &update.max_trace_entries_per_transaction,
            );
            set(
                &mut c.max_stack_trace_samples_per_transaction,
                &update.max_stack_trace_samples_per_transaction,
            );
            set(&mut c.capture_thread_info, &update.capture_thread_info);
            set(&mut c.capture_gc_info, &update.capture_gc_info);
            set(
                &mut c.mbean_gauge_not_found_delay_seconds,
                &update.mbean_gauge_not_found_delay_seconds,
            );
            set(&mut c.internal_query_timeout_seconds, &update.internal_query_timeout_seconds);
            Ok(c)
        })?;
        Ok(AdvancedResponse {
            config: VersionedView {
                config: committed.current,
                version: committed.version,
            },
            timer_wrapper_methods_active: self.runtime.timer_wrapper_methods_active,
        })
    }

    pub fn list_plugins(&self) -> Result<Vec<PluginSummary>> {
        self.plugins
            .iter()
            .map(|descriptor| {
                let (config, _) =
                    self.load::<PluginConfig>(&ConfigDomain::Plugin(descriptor.id.clone()))?;
                Ok(PluginSummary {
                    id: descriptor.id.clone(),
                    name: descriptor.name.clone(),
                    enabled: config.enabled,
                })
            })
            .collect()
    }

    pub fn get_plugin(&self, id: &str) -> Result<PluginResponse> {
        let descriptor = self.descriptor(id)?;
        let (config, version) = self.load::<PluginConfig>(&ConfigDomain::Plugin(id.to_string()))?;
        Ok(PluginResponse::new(descriptor, &config, version))
    }

    /// Update a plugin. Properties must be declared by the plugin and carry
    /// the declared type.
    pub fn update_plugin(&self, id: &str, update: &PluginUpdate) -> Result<PluginResponse> {
        let descriptor = self.descriptor(id)?;
        let domain = ConfigDomain::Plugin(id.to_string());
        let committed = self.mutate(&domain, update.version, |prior: &PluginConfig| {
            let mut candidate = prior.clone();
            set(&mut candidate.enabled, &update.enabled);
            for (name, value) in &update.properties {
                let declared = descriptor.property(name).ok_or_else(|| ConfigError::InvalidField {
                    field: name.clone(),
                    reason: format!("property is not declared by plugin {}", id),
                })?;
                if value.property_type() != declared.property_type {
                    return Err(ConfigError::InvalidField {
                        field: name.clone(),
                        reason: format!(
                            "expected {:?} value, got {:?}",
                            declared.property_type,
                            value.property_type()
                        ),
                    });
                }
                candidate.properties.insert(name.clone(), value.clone());
            }
            Ok(candidate)
        })?;
        Ok(PluginResponse::new(descriptor, &committed.current, committed.version))
    }
}

fn merge_smtp_fields(prior: &SmtpConfig, update: &SmtpUpdate) -> SmtpConfig {
    let mut candidate = prior.clone();
    set(&mut candidate.from_email_address, &update.from_email_address);
    set(&mut candidate.from_display_name, &update.from_display_name);
    set(&mut candidate.host, &update.host);
    set(&mut candidate.port, &update.port);
    set(&mut candidate.ssl, &update.ssl);
    set(&mut candidate.username, &update.username);
    set(&mut candidate.additional_properties, &update.additional_properties);
    candidate
}

impl std::fmt::Debug for ConfigMutationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigMutationService")
            .field("store", &self.store)
            .field("plugins", &self.plugins.len())
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}
