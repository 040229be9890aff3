use anyhow::Result;
use clap::{Parser, Subcommand};
use lumen_config::ConfigDomain;
use reqwest::Client;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lumen-mgmt")]
#[command(about = "Lumen management service and CLI", long_about = None)]
pub struct Cli {
    #[arg(short, long, default_value = "http://localhost:4000", env = "LUMEN_SERVER")]
    pub server: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the admin API
    Serve {
        #[arg(short, long, default_value = "/etc/lumen/mgmt.toml")]
        config: PathBuf,
    },
    /// Print one configuration domain (general, ui, storage, smtp,
    /// user-recording, advanced, plugin:<id>)
    Show {
        domain: String,
    },
    /// List plugins and whether they are enabled
    Plugins,
}

/// API path serving `domain`
pub fn endpoint(domain: &ConfigDomain) -> String {
    match domain {
        ConfigDomain::Plugin(id) => format!("/backend/config/plugin/{}", id),
        other => format!("/backend/config/{}", other.name()),
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Show { ref domain } => self.show(domain).await,
            Command::Plugins => self.plugins().await,
            Command::Serve { .. } => anyhow::bail!("serve is handled by the binary entry point"),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.server.trim_end_matches('/'), path);
        let response = Client::new().get(&url).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("Request failed: {}", response.status());
        }
        Ok(response.json().await?)
    }

    async fn show(&self, domain: &str) -> Result<()> {
        let domain = ConfigDomain::parse(domain)
            .ok_or_else(|| anyhow::anyhow!("Unknown configuration domain: {}", domain))?;
        let value: serde_json::Value = self.get_json(&endpoint(&domain)).await?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        Ok(())
    }

    async fn plugins(&self) -> Result<()> {
        #[derive(Deserialize)]
        struct PluginSummary {
            id: String,
            name: String,
            enabled: bool,
        }

        let plugins: Vec<PluginSummary> = self.get_json("/backend/config/plugins").await?;

        println!("{:<24} {:<32} {:<8}", "ID", "NAME", "ENABLED");
        println!("{}", "-".repeat(64));
        for plugin in plugins {
            println!("{:<24} {:<32} {:<8}", plugin.id, plugin.name, plugin.enabled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_serve_default_config() {
        let cli = Cli::parse_from(["lumen-mgmt", "serve"]);
        match &cli.command {
            Command::Serve { config } => {
                assert_eq!(config, &PathBuf::from("/etc/lumen/mgmt.toml"))
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_serve_custom_config() {
        let cli = Cli::parse_from(["lumen-mgmt", "serve", "--config", "/tmp/lumen.json"]);
        match &cli.command {
            Command::Serve { config } => assert_eq!(config, &PathBuf::from("/tmp/lumen.json")),
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_show_subcommand() {
        let cli = Cli::parse_from(["lumen-mgmt", "--server", "http://apm01:4000", "show", "smtp"]);
        assert_eq!(cli.server, "http://apm01:4000");
        match &cli.command {
            Command::Show { domain } => assert_eq!(domain, "smtp"),
            _ => panic!("Expected Show command"),
        }
    }

    #[test]
    fn test_cli_plugins_subcommand() {
        let cli = Cli::parse_from(["lumen-mgmt", "plugins"]);
        assert!(matches!(cli.command, Command::Plugins));
    }

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(endpoint(&ConfigDomain::General), "/backend/config/general");
        assert_eq!(endpoint(&ConfigDomain::UserInterface), "/backend/config/ui");
        assert_eq!(
            endpoint(&ConfigDomain::UserRecording),
            "/backend/config/user-recording"
        );
        assert_eq!(
            endpoint(&ConfigDomain::Plugin("jdbc".to_string())),
            "/backend/config/plugin/jdbc"
        );
    }

    #[tokio::test]
    async fn test_show_rejects_unknown_domain() {
        let cli = Cli::parse_from(["lumen-mgmt", "show", "alerts"]);
        let err = cli.run().await.unwrap_err();
        assert!(err.to_string().contains("Unknown configuration domain"));
    }
}
