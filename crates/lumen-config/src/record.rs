//! Configuration domains and their record types.
//!
//! Every domain is a plain value type. `ConfigRecord` tags them so the store
//! can hold one cell per domain without a trait object hierarchy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key identifying one configuration record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigDomain {
    General,
    UserInterface,
    Storage,
    Smtp,
    UserRecording,
    Advanced,
    Plugin(String),
}

impl ConfigDomain {
    /// Domains that exist regardless of installed plugins
    pub const BUILT_IN: [ConfigDomain; 6] = [
        ConfigDomain::General,
        ConfigDomain::UserInterface,
        ConfigDomain::Storage,
        ConfigDomain::Smtp,
        ConfigDomain::UserRecording,
        ConfigDomain::Advanced,
    ];

    /// Stable textual name used by logs, the durable source and the API
    pub fn name(&self) -> String {
        match self {
            ConfigDomain::General => "general".to_string(),
            ConfigDomain::UserInterface => "ui".to_string(),
            ConfigDomain::Storage => "storage".to_string(),
            ConfigDomain::Smtp => "smtp".to_string(),
            ConfigDomain::UserRecording => "user-recording".to_string(),
            ConfigDomain::Advanced => "advanced".to_string(),
            ConfigDomain::Plugin(id) => format!("plugin:{}", id),
        }
    }

    /// Inverse of [`ConfigDomain::name`]
    pub fn parse(name: &str) -> Option<ConfigDomain> {
        match name {
            "general" => Some(ConfigDomain::General),
            "ui" => Some(ConfigDomain::UserInterface),
            "storage" => Some(ConfigDomain::Storage),
            "smtp" => Some(ConfigDomain::Smtp),
            "user-recording" => Some(ConfigDomain::UserRecording),
            "advanced" => Some(ConfigDomain::Advanced),
            other => other
                .strip_prefix("plugin:")
                .filter(|id| !id.is_empty())
                .map(|id| ConfigDomain::Plugin(id.to_string())),
        }
    }
}

impl fmt::Display for ConfigDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub enabled: bool,
    pub trace_store_threshold_millis: u32,
    pub profiling_interval_millis: u32,
    pub default_transaction_type: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trace_store_threshold_millis: 1000,
            profiling_interval_millis: 1000,
            default_transaction_type: String::new(),
        }
    }
}

/// Capability granted to callers without a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnonymousAccess {
    None,
    ReadOnly,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInterfaceConfig {
    pub port: u16,
    /// Argon2 PHC string; `None` means the admin password is disabled
    pub admin_password_hash: Option<String>,
    /// Argon2 PHC string; `None` means the read-only password is disabled
    pub read_only_password_hash: Option<String>,
    pub anonymous_access: AnonymousAccess,
    pub session_timeout_minutes: u32,
}

impl UserInterfaceConfig {
    pub fn admin_password_enabled(&self) -> bool {
        self.admin_password_hash.is_some()
    }

    pub fn read_only_password_enabled(&self) -> bool {
        self.read_only_password_hash.is_some()
    }
}

impl Default for UserInterfaceConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            admin_password_hash: None,
            read_only_password_hash: None,
            anonymous_access: AnonymousAccess::Admin,
            session_timeout_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub aggregate_expiration_hours: u32,
    pub trace_expiration_hours: u32,
    pub gauge_expiration_hours: u32,
    pub capped_database_size_mb: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            aggregate_expiration_hours: 24 * 30,
            trace_expiration_hours: 24 * 7,
            gauge_expiration_hours: 24 * 7,
            capped_database_size_mb: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub from_email_address: String,
    pub from_display_name: String,
    pub host: String,
    pub port: Option<u16>,
    pub ssl: bool,
    pub username: String,
    /// Hex of `nonce || ciphertext`; never sent to clients
    pub encrypted_password: Option<String>,
    pub additional_properties: BTreeMap<String, String>,
}

impl SmtpConfig {
    pub fn password_exists(&self) -> bool {
        self.encrypted_password.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecordingConfig {
    pub enabled: bool,
    pub user: String,
    pub profile_interval_millis: u32,
}

impl Default for UserRecordingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            user: String::new(),
            profile_interval_millis: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedConfig {
    pub timer_wrapper_methods: bool,
    pub weaving_timer: bool,
    pub immediate_partial_store_threshold_seconds: u32,
    pub max_aggregate_queries_per_query_type: u32,
    pub max_trace_entries_per_transaction: u32,
    pub max_stack_trace_samples_per_transaction: u32,
    pub capture_thread_info: bool,
    pub capture_gc_info: bool,
    pub mbean_gauge_not_found_delay_seconds: u32,
    pub internal_query_timeout_seconds: u32,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            timer_wrapper_methods: false,
            weaving_timer: false,
            immediate_partial_store_threshold_seconds: 60,
            max_aggregate_queries_per_query_type: 500,
            max_trace_entries_per_transaction: 2000,
            max_stack_trace_samples_per_transaction: 10000,
            capture_thread_info: true,
            capture_gc_info: true,
            mbean_gauge_not_found_delay_seconds: 60,
            internal_query_timeout_seconds: 60,
        }
    }
}

/// Typed value of a plugin property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Boolean(bool),
    Double(f64),
    String(String),
}

impl PropertyValue {
    pub fn property_type(&self) -> PropertyType {
        match self {
            PropertyValue::Boolean(_) => PropertyType::Boolean,
            PropertyValue::Double(_) => PropertyType::Double,
            PropertyValue::String(_) => PropertyType::String,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Boolean,
    Double,
    String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    pub default: PropertyValue,
}

/// Plugin metadata supplied by the embedding process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
}

impl PluginDescriptor {
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Record used when nothing is stored for this plugin yet
    pub fn default_config(&self) -> PluginConfig {
        PluginConfig {
            id: self.id.clone(),
            enabled: true,
            properties: self
                .properties
                .iter()
                .map(|p| (p.name.clone(), p.default.clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub id: String,
    pub enabled: bool,
    pub properties: BTreeMap<String, PropertyValue>,
}

/// One configuration record, tagged by domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", content = "config", rename_all = "snake_case")]
pub enum ConfigRecord {
    General(GeneralConfig),
    UserInterface(UserInterfaceConfig),
    Storage(StorageConfig),
    Smtp(SmtpConfig),
    UserRecording(UserRecordingConfig),
    Advanced(AdvancedConfig),
    Plugin(PluginConfig),
}

impl ConfigRecord {
    pub fn domain(&self) -> ConfigDomain {
        match self {
            ConfigRecord::General(_) => ConfigDomain::General,
            ConfigRecord::UserInterface(_) => ConfigDomain::UserInterface,
            ConfigRecord::Storage(_) => ConfigDomain::Storage,
            ConfigRecord::Smtp(_) => ConfigDomain::Smtp,
            ConfigRecord::UserRecording(_) => ConfigDomain::UserRecording,
            ConfigRecord::Advanced(_) => ConfigDomain::Advanced,
            ConfigRecord::Plugin(p) => ConfigDomain::Plugin(p.id.clone()),
        }
    }

    /// Default record for a built-in domain; plugins need their descriptor
    pub fn default_for(domain: &ConfigDomain) -> Option<ConfigRecord> {
        match domain {
            ConfigDomain::General => Some(ConfigRecord::General(GeneralConfig::default())),
            ConfigDomain::UserInterface => {
                Some(ConfigRecord::UserInterface(UserInterfaceConfig::default()))
            }
            ConfigDomain::Storage => Some(ConfigRecord::Storage(StorageConfig::default())),
            ConfigDomain::Smtp => Some(ConfigRecord::Smtp(SmtpConfig::default())),
            ConfigDomain::UserRecording => {
                Some(ConfigRecord::UserRecording(UserRecordingConfig::default()))
            }
            ConfigDomain::Advanced => Some(ConfigRecord::Advanced(AdvancedConfig::default())),
            ConfigDomain::Plugin(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_descriptor() -> PluginDescriptor {
        PluginDescriptor {
            id: "jdbc".to_string(),
            name: "JDBC Plugin".to_string(),
            properties: vec![
                PropertyDescriptor {
                    name: "captureBindParameters".to_string(),
                    label: "Capture bind parameters".to_string(),
                    property_type: PropertyType::Boolean,
                    default: PropertyValue::Boolean(true),
                },
                PropertyDescriptor {
                    name: "stackTraceThresholdMillis".to_string(),
                    label: String::new(),
                    property_type: PropertyType::Double,
                    default: PropertyValue::Double(1000.0),
                },
            ],
        }
    }

    #[test]
    fn domain_names_round_trip() {
        let mut domains = ConfigDomain::BUILT_IN.to_vec();
        domains.push(ConfigDomain::Plugin("servlet".to_string()));
        for domain in domains {
            assert_eq!(ConfigDomain::parse(&domain.name()), Some(domain));
        }
    }

    #[test]
    fn parse_rejects_unknown_and_empty_plugin() {
        assert_eq!(ConfigDomain::parse("alerts"), None);
        assert_eq!(ConfigDomain::parse("plugin:"), None);
    }

    #[test]
    fn ui_defaults_are_open_admin_access() {
        let ui = UserInterfaceConfig::default();
        assert_eq!(ui.anonymous_access, AnonymousAccess::Admin);
        assert!(!ui.admin_password_enabled());
        assert!(!ui.read_only_password_enabled());
        assert_eq!(ui.port, 4000);
    }

    #[test]
    fn anonymous_access_wire_names() {
        let json = serde_json::to_string(&AnonymousAccess::ReadOnly).unwrap();
        assert_eq!(json, r#""READ_ONLY""#);
        let parsed: AnonymousAccess = serde_json::from_str(r#""NONE""#).unwrap();
        assert_eq!(parsed, AnonymousAccess::None);
    }

    #[test]
    fn descriptor_default_config_uses_property_defaults() {
        let config = sample_descriptor().default_config();
        assert_eq!(config.id, "jdbc");
        assert!(config.enabled);
        assert_eq!(
            config.properties.get("captureBindParameters"),
            Some(&PropertyValue::Boolean(true))
        );
        assert_eq!(config.properties.len(), 2);
    }

    #[test]
    fn property_value_untagged_parsing() {
        let v: PropertyValue = serde_json::from_str("12.5").unwrap();
        assert_eq!(v.property_type(), PropertyType::Double);
        let v: PropertyValue = serde_json::from_str("false").unwrap();
        assert_eq!(v.property_type(), PropertyType::Boolean);
        let v: PropertyValue = serde_json::from_str(r#""x""#).unwrap();
        assert_eq!(v.property_type(), PropertyType::String);
    }

    #[test]
    fn record_reports_its_domain() {
        let record = ConfigRecord::Plugin(sample_descriptor().default_config());
        assert_eq!(record.domain(), ConfigDomain::Plugin("jdbc".to_string()));
        assert!(ConfigRecord::default_for(&record.domain()).is_none());
        assert_eq!(
            ConfigRecord::default_for(&ConfigDomain::Smtp).map(|r| r.domain()),
            Some(ConfigDomain::Smtp)
        );
    }
}
