//! `clinic-assistant` - conversational access to a therapy practice's records
//!
//! Runs the assistant as a WebSocket server, a one-shot question, an
//! interactive chat or direct tool calls.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use clinic_assistant_core::clinic::{ClinicSnapshot, InMemoryClinic};
use clinic_assistant_core::{AssistantConfig, AssistantService};

use crate::cli::{Cli, Commands, ConfigCommand};

mod cli;
mod server;

/// Sample practice served when no data file is configured
pub(crate) const SAMPLE_CLINIC: &str = include_str!("../demos/clinic.json");

/// Main entry point for the clinic assistant CLI
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = AssistantConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match &cli.command {
        Commands::Config { cmd } => match cmd {
            ConfigCommand::Init { force } => {
                let path = config_path(&cli)?;
                cli::commands::config_init(&path, *force)?;
            }
            ConfigCommand::Show => cli::commands::config_show(&config)?,
        },

        Commands::Serve { host, port } => {
            let mut server_config = config.server.clone();
            if let Some(host) = host {
                server_config.host = host.clone();
            }
            if let Some(port) = port {
                server_config.port = *port;
            }
            let service = Arc::new(build_service(&cli, &config)?);
            server::start_server(service, &server_config.address()).await?;
        }

        Commands::Ask { query, trace } => {
            let service = build_service(&cli, &config)?;
            cli::commands::ask(&service, &query.join(" "), *trace).await?;
        }

        Commands::Chat { trace } => {
            let service = build_service(&cli, &config)?;
            cli::commands::chat(&service, *trace).await?;
        }

        Commands::Tool { name, input } => {
            let service = build_service(&cli, &config)?;
            cli::commands::tool(&service, name, input.as_deref()).await?;
        }

        Commands::Tools => {
            let service = build_service(&cli, &config)?;
            cli::commands::tools(&service);
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => AssistantConfig::default_path().context("Could not find config directory"),
    }
}

fn load_clinic(path: Option<&Path>) -> Result<InMemoryClinic> {
    match path {
        Some(path) => InMemoryClinic::from_file(path),
        None => {
            tracing::info!("No clinic data configured, serving the bundled sample practice");
            Ok(InMemoryClinic::new(ClinicSnapshot::from_json(SAMPLE_CLINIC)?))
        }
    }
}

fn build_service(cli: &Cli, config: &AssistantConfig) -> Result<AssistantService> {
    let data_path = cli.data.as_deref().or(config.data.fixture_path.as_deref());
    let clinic = load_clinic(data_path)?;
    let service = AssistantService::from_config(config, Arc::new(clinic))?;
    tracing::debug!("clinic-assistant {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));
    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_sample_parses() {
        let snapshot = ClinicSnapshot::from_json(SAMPLE_CLINIC).unwrap();
        assert_eq!(snapshot.patients.len(), 6);
        assert!(!snapshot.goals.is_empty());
    }

    #[test]
    fn test_data_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clinic.json");
        std::fs::write(&path, r#"{"patients":[{"id":1,"identifier":"100001","name":"Test Patient","active":true}]}"#)
            .unwrap();
        let clinic = load_clinic(Some(&path)).unwrap();
        assert_eq!(clinic.snapshot().patients.len(), 1);
    }
}
