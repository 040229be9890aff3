use anyhow::Result;
use clap::Parser;
use lumen_mgmt::cli::{Cli, Command};
use lumen_mgmt::{server, LogFormat, MgmtConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::Serve { config } => {
            let config = MgmtConfig::load_or_default(config)?;
            server::init_tracing(config.log_format);
            tracing::info!("Lumen management service starting...");
            server::run(config).await
        }
        _ => {
            server::init_tracing(LogFormat::Text);
            cli.run().await
        }
    }
}
