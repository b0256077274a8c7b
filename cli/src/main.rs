// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # RFA Remote File Access
//!
//! The `rfa` binary runs either side of the remote file access service.
//!
//! ## Commands
//!
//! - `rfa server` - Export a directory over UDP
//! - `rfa client` - Interactive shell against a running server, with a
//!   local cache kept coherent by freshness checks and server callbacks
//! - `rfa config show|validate|generate` - Configuration management
//!
//! Configuration is discovered from `--config`, `RFA_CONFIG_PATH`,
//! `./rfa-config.yaml`, `~/.rfa/config.yaml` and `/etc/rfa/config.yaml`.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use rfa_cli::commands::{self, ClientArgs, ConfigCommand, ServerArgs};
use rfa_core::domain::config::{MetricsConfig, RfaConfigManifest};

/// RFA - Remote file access over UDP with client-side caching
#[derive(Parser)]
#[command(name = "rfa")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "RFA_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true, env = "RFA_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the file server
    #[command(name = "server")]
    Server(ServerArgs),

    /// Start an interactive client session
    #[command(name = "client")]
    Client(ClientArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        eprintln!("{}", "No command specified. Use --help for usage.".yellow());
        std::process::exit(1);
    };

    match command {
        Commands::Config { command } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), "text")?;
            commands::config::handle_command(command, cli.config).await
        }
        Commands::Server(args) => {
            let config = load_config(cli.config, cli.log_level.as_deref())?;
            commands::server::run(args, config).await
        }
        Commands::Client(args) => {
            let config = load_config(cli.config, cli.log_level.as_deref())?;
            commands::client::run(args, config).await
        }
    }
}

/// Load configuration and bring up logging and metrics from it
fn load_config(path: Option<PathBuf>, log_level: Option<&str>) -> Result<RfaConfigManifest> {
    let config = RfaConfigManifest::load_or_default(path).context("Failed to load configuration")?;

    let logging = config.logging();
    init_logging(log_level.unwrap_or(&logging.level), &logging.format)?;
    init_metrics(&config.metrics())?;

    Ok(config)
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

/// Serve Prometheus metrics when enabled
fn init_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics exporter listening on {}", addr);
    Ok(())
}
