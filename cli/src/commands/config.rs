// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use rfa_core::domain::config::RfaConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with every default spelled out
    Generate {
        /// Output path (default: ./rfa-config.yaml)
        #[arg(short, long, default_value = "./rfa-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(&output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = RfaConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. RFA_CONFIG_PATH: {}",
            std::env::var("RFA_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./rfa-config.yaml");
        println!("  4. ~/.rfa/config.yaml");
        println!("  5. /etc/rfa/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    let server = &config.spec.server;
    println!("{}", "Server:".bold());
    println!("  Listen: {}:{}", server.bind_address, server.port);
    println!("  Root: {}", server.root_dir.display());
    println!("  Semantics: {}", server.semantics);
    println!("  Reply loss: {}", server.response_loss_probability);
    match server.pending_response_capacity {
        Some(capacity) => println!("  Stored responses: up to {}", capacity),
        None => println!("  Stored responses: {}", "unbounded".dimmed()),
    }
    println!();

    let client = &config.spec.client;
    println!("{}", "Client:".bold());
    println!("  Server: {}:{}", client.server_address, client.server_port);
    println!(
        "  Freshness interval: {}",
        humantime_serde::re::humantime::format_duration(client.freshness_interval)
    );
    println!(
        "  Request timeout: {} x {} attempts",
        humantime_serde::re::humantime::format_duration(client.request_timeout),
        client.max_attempts
    );
    println!("  Request loss: {}", client.request_loss_probability);
    println!();

    let logging = config.logging();
    let metrics = config.metrics();
    println!("{}", "Observability:".bold());
    println!("  Logging: {} ({})", logging.level, logging.format);
    if metrics.enabled {
        println!("  Metrics: port {}", metrics.port);
    } else {
        println!("  Metrics: {}", "disabled".dimmed());
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = RfaConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    RfaConfigManifest::default()
        .to_yaml_file(output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_generated_config_validates() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("rfa-config.yaml");

        generate(&output, false).await.unwrap();
        validate(Some(output.clone())).await.unwrap();

        assert!(generate(&output, false).await.is_err());
        generate(&output, true).await.unwrap();
    }
}
