use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use grc_agent_runtime::AgentPlatform;
use grc_api::GrcServer;
use grc_common::{init_tracing_with_level, shutdown_tracer, SystemConfig};
use std::path::Path;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "grc-server")]
#[command(about = "GRC agent platform server")]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    /// Log level filter, overrides the config file
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run every due agent once and exit
    RunScheduled,
    /// Apply database migrations and exit
    Migrate,
    /// Load and validate the configuration, then exit
    ValidateConfig,
}

fn load_config(path: &str) -> Result<SystemConfig> {
    if Path::new(path).exists() {
        SystemConfig::load(path).with_context(|| format!("Failed to load config from {}", path))
    } else {
        let mut config = SystemConfig::default();
        config.apply_env_overrides();
        config.validate().context("Default configuration is invalid")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let level = cli.log_level.clone().unwrap_or_else(|| config.telemetry.log_level.clone());
    init_tracing_with_level(&level, config.telemetry.otlp_endpoint.as_deref())?;
    if !Path::new(&cli.config).exists() {
        tracing::warn!("Config file {} not found, using defaults and environment", cli.config);
    }

    let result = run(cli.command.unwrap_or(Command::Serve { host: None, port: None }), config).await;
    if let Err(e) = &result {
        tracing::error!("grc-server failed: {:#}", e);
    }

    shutdown_tracer();
    result
}

async fn run(command: Command, mut config: SystemConfig) -> Result<()> {
    match command {
        Command::ValidateConfig => {
            tracing::info!("Configuration is valid");
            println!("{}", config_summary(&config));
            Ok(())
        }
        Command::Migrate => {
            grc_storage::initialize_storage(&config.storage.postgres_url, config.storage.max_connections).await?;
            tracing::info!("Migrations applied");
            Ok(())
        }
        Command::RunScheduled => {
            let platform = build_platform(&config).await?;
            let report = platform.scheduler.run_due_agents(Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let platform = build_platform(&config).await?;
            GrcServer::new(platform, config).run().await
        }
    }
}

async fn build_platform(config: &SystemConfig) -> Result<AgentPlatform> {
    let store =
        grc_storage::initialize_storage(&config.storage.postgres_url, config.storage.max_connections).await?;
    AgentPlatform::from_config(Arc::new(store), config)
}

/// Non-secret view of the effective configuration
fn config_summary(config: &SystemConfig) -> String {
    format!(
        "server: {}:{}\nllm model: {} (api key {})\nsearch: {}\ncron secret: {}\nbilling secret: {}",
        config.server.host,
        config.server.port,
        config.llm.model,
        if config.llm.api_key.is_some() { "set" } else { "missing" },
        config.search.endpoint.as_deref().unwrap_or("disabled"),
        if config.security.cron_secret.is_some() { "set" } else { "missing" },
        if config.security.billing_secret.is_some() { "set" } else { "missing" },
    )
}
