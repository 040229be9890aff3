use lumen_config::PluginDescriptor;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "config.json";
const SECRET_FILE_NAME: &str = "secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Server settings read at startup. The UI port itself is part of the
/// stored configuration, not of this file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MgmtConfig {
    pub bind_ip: IpAddr,
    pub data_dir: PathBuf,
    pub log_format: LogFormat,
    /// Name used in default sender addresses; the host name when unset
    pub server_name: Option<String>,
    pub plugins: Vec<PluginDescriptor>,
}

impl Default for MgmtConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            data_dir: PathBuf::from("/var/lib/lumen"),
            log_format: LogFormat::Text,
            server_name: None,
            plugins: Vec::new(),
        }
    }
}

impl MgmtConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => Ok(toml::from_str(&contents)?),
            "json" => Ok(serde_json::from_str(&contents)?),
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::warn!("Config file not found, using defaults: {}", path.display());
            Ok(Self::default())
        }
    }

    pub fn config_store_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE_NAME)
    }

    pub fn secret_key_path(&self) -> PathBuf {
        self.data_dir.join(SECRET_FILE_NAME)
    }

    pub fn local_server_name(&self) -> String {
        if let Some(name) = self.server_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        match hostname::get() {
            Ok(name) => name.to_string_lossy().into_owned(),
            Err(e) => {
                tracing::warn!("Could not read host name: {}", e);
                "localhost".to_string()
            }
        }
    }
}
