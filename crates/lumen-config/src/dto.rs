//! Update requests and read views exchanged with clients.
//!
//! Updates are sparse: every plain field is optional and an absent field keeps
//! the current value. Views never carry password hashes or ciphertext.

use crate::fingerprint::Fingerprint;
use crate::record::{
    AnonymousAccess, PluginDescriptor, PluginConfig, PropertyDescriptor, PropertyValue,
    SmtpConfig, UserInterfaceConfig,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Distinguishes an absent field from an explicit `null`
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralUpdate {
    pub enabled: Option<bool>,
    pub trace_store_threshold_millis: Option<u32>,
    pub profiling_interval_millis: Option<u32>,
    pub default_transaction_type: Option<String>,
    pub version: Fingerprint,
}

/// Access/UI update. Password fields are write-only signals.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInterfaceUpdate {
    pub port: Option<u16>,
    pub session_timeout_minutes: Option<u32>,
    pub anonymous_access: Option<AnonymousAccess>,
    #[serde(default)]
    pub current_admin_password: String,
    #[serde(default)]
    pub new_admin_password: String,
    /// `None` keeps the read-only password as it is
    pub read_only_password_enabled: Option<bool>,
    #[serde(default)]
    pub new_read_only_password: String,
    pub version: Fingerprint,
}

impl UserInterfaceUpdate {
    /// Update that changes nothing, for building requests in code
    pub fn unchanged(version: Fingerprint) -> Self {
        Self {
            port: None,
            session_timeout_minutes: None,
            anonymous_access: None,
            current_admin_password: String::new(),
            new_admin_password: String::new(),
            read_only_password_enabled: None,
            new_read_only_password: String::new(),
            version,
        }
    }
}

impl std::fmt::Debug for UserInterfaceUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserInterfaceUpdate")
            .field("port", &self.port)
            .field("session_timeout_minutes", &self.session_timeout_minutes)
            .field("anonymous_access", &self.anonymous_access)
            .field("read_only_password_enabled", &self.read_only_password_enabled)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageUpdate {
    pub aggregate_expiration_hours: Option<u32>,
    pub trace_expiration_hours: Option<u32>,
    pub gauge_expiration_hours: Option<u32>,
    pub capped_database_size_mb: Option<u32>,
    pub version: Fingerprint,
}

/// Outbound mail update. `password_exists` and `new_password` drive the
/// keep/clear/change decision for the stored credential.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtpUpdate {
    pub from_email_address: Option<String>,
    pub from_display_name: Option<String>,
    pub host: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub port: Option<Option<u16>>,
    pub ssl: Option<bool>,
    pub username: Option<String>,
    /// `None` keeps the credential as it is
    pub password_exists: Option<bool>,
    #[serde(default)]
    pub new_password: String,
    pub additional_properties: Option<BTreeMap<String, String>>,
    pub version: Fingerprint,
}

impl SmtpUpdate {
    pub fn unchanged(version: Fingerprint) -> Self {
        Self {
            from_email_address: None,
            from_display_name: None,
            host: None,
            port: None,
            ssl: None,
            username: None,
            password_exists: None,
            new_password: String::new(),
            additional_properties: None,
            version,
        }
    }
}

impl std::fmt::Debug for SmtpUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpUpdate")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("ssl", &self.ssl)
            .field("username", &self.username)
            .field("password_exists", &self.password_exists)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Candidate mail configuration for a test message; never persisted
#[derive(Clone, Serialize, Deserialize)]
pub struct SendTestEmailRequest {
    #[serde(flatten)]
    pub config: SmtpUpdate,
    pub test_email_recipient: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecordingUpdate {
    pub enabled: Option<bool>,
    pub user: Option<String>,
    pub profile_interval_millis: Option<u32>,
    pub version: Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedUpdate {
    pub timer_wrapper_methods: Option<bool>,
    pub weaving_timer: Option<bool>,
    pub immediate_partial_store_threshold_seconds: Option<u32>,
    pub max_aggregate_queries_per_query_type: Option<u32>,
    pub max_trace_entries_per_transaction: Option<u32>,
    pub max_stack_trace_samples_per_transaction: Option<u32>,
    pub capture_thread_info: Option<bool>,
    pub capture_gc_info: Option<bool>,
    pub mbean_gauge_not_found_delay_seconds: Option<u32>,
    pub internal_query_timeout_seconds: Option<u32>,
    pub version: Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginUpdate {
    pub enabled: Option<bool>,
    /// Properties to overwrite; unlisted properties keep their value
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    pub version: Fingerprint,
}

/// A plain record with its version token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionedView<T> {
    #[serde(flatten)]
    pub config: T,
    pub version: Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserInterfaceView {
    pub port: u16,
    pub admin_password_enabled: bool,
    pub read_only_password_enabled: bool,
    pub anonymous_access: AnonymousAccess,
    pub session_timeout_minutes: u32,
    pub version: Fingerprint,
}

impl UserInterfaceView {
    pub fn new(config: &UserInterfaceConfig, version: Fingerprint) -> Self {
        Self {
            port: config.port,
            admin_password_enabled: config.admin_password_enabled(),
            read_only_password_enabled: config.read_only_password_enabled(),
            anonymous_access: config.anonymous_access,
            session_timeout_minutes: config.session_timeout_minutes,
            version,
        }
    }
}

/// Read-only status of the HTTP listener, supplied by whoever owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub active_port: u16,
    pub port_change_failed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserInterfaceResponse {
    pub config: UserInterfaceView,
    pub active_port: u16,
    pub port_change_failed: bool,
}

impl UserInterfaceResponse {
    pub fn new(config: UserInterfaceView, status: ServerStatus) -> Self {
        Self {
            config,
            active_port: status.active_port,
            port_change_failed: status.port_change_failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmtpView {
    pub from_email_address: String,
    pub from_display_name: String,
    pub host: String,
    pub port: Option<u16>,
    pub ssl: bool,
    pub username: String,
    pub password_exists: bool,
    pub additional_properties: BTreeMap<String, String>,
    pub version: Fingerprint,
}

impl SmtpView {
    pub fn new(config: &SmtpConfig, version: Fingerprint) -> Self {
        Self {
            from_email_address: config.from_email_address.clone(),
            from_display_name: config.from_display_name.clone(),
            host: config.host.clone(),
            port: config.port,
            ssl: config.ssl,
            username: config.username.clone(),
            password_exists: config.password_exists(),
            additional_properties: config.additional_properties.clone(),
            version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmtpResponse {
    pub config: SmtpView,
    pub local_server_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvancedResponse<T> {
    pub config: VersionedView<T>,
    pub timer_wrapper_methods_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginSummary {
    pub id: String,
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginView {
    pub enabled: bool,
    pub properties: BTreeMap<String, PropertyValue>,
    pub version: Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginResponse {
    pub name: String,
    pub property_descriptors: Vec<PropertyDescriptor>,
    pub config: PluginView,
}

impl PluginResponse {
    pub fn new(descriptor: &PluginDescriptor, config: &PluginConfig, version: Fingerprint) -> Self {
        Self {
            name: descriptor.name.clone(),
            property_descriptors: descriptor.properties.clone(),
            config: PluginView {
                enabled: config.enabled,
                properties: config.properties.clone(),
                version,
            },
        }
    }
}
