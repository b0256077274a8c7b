// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// RFA Configuration Types
//
// Defines the configuration schema shared by the `rfa server` and
// `rfa client` processes:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Server bind address, export root and invocation semantics
// - Client server endpoint, cache freshness and retry policy
// - Fault injection probabilities for both sides
// - Observability settings

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::semantics::InvocationSemantics;

pub const API_VERSION: &str = "rfa.dev/v1";
pub const KIND: &str = "RfaConfig";

/// Top-level Kubernetes-style configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RfaConfigManifest {
    /// API version (must be "rfa.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "RfaConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: RfaConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Content under spec:
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RfaConfigSpec {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory exported to clients
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    #[serde(default)]
    pub semantics: InvocationSemantics,

    /// Probability in [0, 1] that a reply is dropped before sending
    #[serde(default)]
    pub response_loss_probability: f64,

    /// Bound on stored at-most-once responses (unbounded when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_response_capacity: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_address")]
    pub server_address: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    /// How long a cached file is trusted without asking the server
    #[serde(default = "default_freshness_interval", with = "humantime_serde")]
    pub freshness_interval: Duration,

    /// Per-attempt wait for a reply
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Probability in [0, 1] that a request send is dropped
    #[serde(default)]
    pub request_loss_probability: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_server_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    2222
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("./rfa-data")
}

fn default_freshness_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9091
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            root_dir: default_root_dir(),
            semantics: InvocationSemantics::default(),
            response_loss_probability: 0.0,
            pending_response_capacity: None,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            server_port: default_port(),
            freshness_interval: default_freshness_interval(),
            request_timeout: default_request_timeout(),
            max_attempts: default_max_attempts(),
            request_loss_probability: 0.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Default for RfaConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "rfa-node".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                labels: None,
            },
            spec: RfaConfigSpec::default(),
        }
    }
}

impl RfaConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. RFA_CONFIG_PATH environment variable
    /// 2. ./rfa-config.yaml (working directory)
    /// 3. ~/.rfa/config.yaml (user home)
    /// 4. /etc/rfa/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("RFA_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./rfa-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".rfa").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/rfa/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RFA_SEMANTICS") {
            match val.parse::<InvocationSemantics>() {
                Ok(semantics) => {
                    tracing::info!("Environment override: RFA_SEMANTICS={}", semantics);
                    self.spec.server.semantics = semantics;
                }
                Err(e) => {
                    tracing::warn!("Invalid value for RFA_SEMANTICS: {}. Ignoring.", e);
                }
            }
        }

        if let Ok(val) = std::env::var("RFA_FRESHNESS_INTERVAL") {
            match humantime_serde::re::humantime::parse_duration(&val) {
                Ok(interval) => {
                    tracing::info!("Environment override: RFA_FRESHNESS_INTERVAL={}", val);
                    self.spec.client.freshness_interval = interval;
                }
                Err(e) => {
                    tracing::warn!(
                        "Invalid value for RFA_FRESHNESS_INTERVAL: '{}' ({}). Expected e.g. '10s'. Ignoring.",
                        val,
                        e
                    );
                }
            }
        }
    }

    /// Logging settings, defaulted when the section is absent
    pub fn logging(&self) -> LoggingConfig {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.clone())
            .unwrap_or_default()
    }

    /// Metrics settings, disabled when the section is absent
    pub fn metrics(&self) -> MetricsConfig {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.metrics.clone())
            .unwrap_or_default()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let server = &self.spec.server;
        if !(0.0..=1.0).contains(&server.response_loss_probability) {
            anyhow::bail!(
                "spec.server.response_loss_probability must be within [0, 1], got {}",
                server.response_loss_probability
            );
        }
        if server.pending_response_capacity == Some(0) {
            anyhow::bail!("spec.server.pending_response_capacity must be at least 1 when set");
        }

        let client = &self.spec.client;
        if !(0.0..=1.0).contains(&client.request_loss_probability) {
            anyhow::bail!(
                "spec.client.request_loss_probability must be within [0, 1], got {}",
                client.request_loss_probability
            );
        }
        if client.max_attempts == 0 {
            anyhow::bail!("spec.client.max_attempts must be at least 1");
        }
        if client.request_timeout.is_zero() {
            anyhow::bail!("spec.client.request_timeout cannot be zero");
        }
        if client.freshness_interval.is_zero() {
            anyhow::bail!("spec.client.freshness_interval cannot be zero");
        }

        if let Some(format) = self
            .spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.as_ref())
            .map(|l| l.format.as_str())
        {
            if format != "json" && format != "text" {
                anyhow::bail!("observability.logging.format must be 'json' or 'text', got '{}'", format);
            }
        }

        Ok(())
    }
}
