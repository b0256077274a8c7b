// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Interactive client command
//!
//! Flags override the `spec.client` section of the loaded configuration.
//! Each shell line runs one file operation; failures are printed and the
//! shell keeps going.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use rfa_core::application::{ClientSession, FileOperations};
use rfa_core::domain::config::{ClientConfig, RfaConfigManifest};

use super::shell::{ShellCommand, HELP};

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

#[derive(Debug, Clone, Args)]
pub struct ClientArgs {
    /// Server host name or address
    #[arg(short, long, env = "RFA_SERVER")]
    pub server: Option<String>,

    /// Server UDP port
    #[arg(short, long, env = "RFA_PORT")]
    pub port: Option<u16>,

    /// How long cached content is trusted (e.g. 10s)
    #[arg(long, value_parser = parse_duration)]
    pub freshness: Option<Duration>,

    /// Wait per attempt before retransmitting (e.g. 500ms)
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Attempts per request before giving up
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Probability in [0, 1] of dropping each request
    #[arg(long, value_name = "P")]
    pub request_loss: Option<f64>,
}

impl ClientArgs {
    pub fn apply(&self, mut config: ClientConfig) -> ClientConfig {
        if let Some(server) = &self.server {
            config.server_address = server.clone();
        }
        if let Some(port) = self.port {
            config.server_port = port;
        }
        if let Some(freshness) = self.freshness {
            config.freshness_interval = freshness;
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout = timeout;
        }
        if let Some(attempts) = self.max_attempts {
            config.max_attempts = attempts;
        }
        if let Some(loss) = self.request_loss {
            config.request_loss_probability = loss;
        }
        config
    }
}

pub async fn run(args: ClientArgs, mut manifest: RfaConfigManifest) -> Result<()> {
    manifest.spec.client = args.apply(manifest.spec.client);
    manifest.validate().context("Configuration validation failed")?;
    let config = &manifest.spec.client;

    let session = ClientSession::connect(config)
        .await
        .context("Failed to start client session")?;

    println!(
        "{}",
        format!(
            "Connected to {} (freshness interval {})",
            session.server(),
            humantime_serde::re::humantime::format_duration(config.freshness_interval)
        )
        .green()
    );
    println!("Type 'help' for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };

        let command = match ShellCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e.to_string().yellow());
                continue;
            }
        };

        if command == ShellCommand::Exit {
            break;
        }
        debug!(?command, "Running shell command");
        execute(session.operations(), command).await;
    }

    session.close();
    Ok(())
}

fn prompt() {
    print!("{} ", "rfa>".bold());
    let _ = std::io::stdout().flush();
}

async fn execute(ops: &FileOperations, command: ShellCommand) {
    let outcome = async {
        match command {
            ShellCommand::Read { path, offset, count } => {
                let bytes = ops.read(&path, offset, count).await?;
                println!("{}", String::from_utf8_lossy(&bytes));
            }
            ShellCommand::Insert { path, offset, text } => {
                let mtime = ops.insert(&path, offset, text.into_bytes()).await?;
                println!("{}", format!("✓ Inserted into {} (mtime {})", path, mtime).green());
            }
            ShellCommand::Append { path, text } => {
                let mtime = ops.append(&path, text.into_bytes()).await?;
                println!("{}", format!("✓ Appended to {} (mtime {})", path, mtime).green());
            }
            ShellCommand::Touch { path } => {
                let atime = ops.touch(&path).await?;
                println!("{}", format!("✓ Touched {} (atime {})", path, atime).green());
            }
            ShellCommand::List { path } => {
                for entry in ops.list_dir(&path).await? {
                    if entry.ends_with('/') {
                        println!("  {}", entry.blue());
                    } else {
                        println!("  {}", entry);
                    }
                }
            }
            ShellCommand::Attr { path } => {
                let attrs = ops.get_attr(&path).await?;
                println!("  mtime: {}", format_millis(attrs.mtime));
                println!("  atime: {}", format_millis(attrs.atime));
            }
            ShellCommand::Register { path, interval } => {
                ops.register(&path, interval).await?;
                println!(
                    "{}",
                    format!(
                        "✓ Registered for updates to {} for {}",
                        path,
                        humantime_serde::re::humantime::format_duration(interval)
                    )
                    .green()
                );
            }
            ShellCommand::Help => println!("{}", HELP),
            ShellCommand::Exit => {}
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    if let Err(e) = outcome {
        println!("{}", format!("✗ {}", e).red());
    }
}

fn format_millis(millis: i64) -> String {
    match Duration::try_from_secs_f64(millis as f64 / 1000.0) {
        Ok(since_epoch) => humantime_serde::re::humantime::format_rfc3339_millis(
            std::time::UNIX_EPOCH + since_epoch,
        )
        .to_string(),
        Err(_) => millis.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = ClientArgs {
            server: Some("files.local".to_string()),
            port: None,
            freshness: Some(Duration::from_secs(3)),
            timeout: None,
            max_attempts: Some(2),
            request_loss: Some(0.25),
        };
        let config = args.apply(ClientConfig::default());
        assert_eq!(config.server_address, "files.local");
        assert_eq!(config.server_port, 2222);
        assert_eq!(config.freshness_interval, Duration::from_secs(3));
        assert_eq!(config.request_timeout, Duration::from_secs(1));
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.request_loss_probability, 0.25);
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(1_500), "1970-01-01T00:00:01.500Z");
    }
}
