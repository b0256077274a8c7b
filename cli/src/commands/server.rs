// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! File server command
//!
//! Flags override the `spec.server` section of the loaded configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::info;

use rfa_core::domain::config::{RfaConfigManifest, ServerConfig};
use rfa_core::domain::semantics::InvocationSemantics;
use rfa_core::infrastructure::FileServer;

#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    /// UDP port to listen on
    #[arg(short, long, env = "RFA_PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "RFA_BIND_ADDRESS")]
    pub bind: Option<String>,

    /// Directory exported to clients
    #[arg(long, value_name = "DIR", env = "RFA_ROOT_DIR")]
    pub root: Option<PathBuf>,

    /// Invocation semantics (at-least-once, at-most-once)
    #[arg(long)]
    pub semantics: Option<InvocationSemantics>,

    /// Probability in [0, 1] of dropping each reply
    #[arg(long, value_name = "P")]
    pub response_loss: Option<f64>,
}

impl ServerArgs {
    pub fn apply(&self, mut config: ServerConfig) -> ServerConfig {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = &self.bind {
            config.bind_address = bind.clone();
        }
        if let Some(root) = &self.root {
            config.root_dir = root.clone();
        }
        if let Some(semantics) = self.semantics {
            config.semantics = semantics;
        }
        if let Some(loss) = self.response_loss {
            config.response_loss_probability = loss;
        }
        config
    }
}

pub async fn run(args: ServerArgs, mut manifest: RfaConfigManifest) -> Result<()> {
    manifest.spec.server = args.apply(manifest.spec.server);
    manifest.validate().context("Configuration validation failed")?;
    let config = &manifest.spec.server;

    let server = FileServer::from_config(config)
        .await
        .context("Failed to start file server")?;
    server.start().await?;

    println!(
        "{}",
        format!(
            "✓ Serving {} on {} ({})",
            config.root_dir.display(),
            server.local_addr()?,
            config.semantics
        )
        .green()
    );
    if config.response_loss_probability > 0.0 {
        println!(
            "  {}",
            format!(
                "Simulating reply loss with probability {}",
                config.response_loss_probability
            )
            .yellow()
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    server.stop().await?;

    Ok(())
}
