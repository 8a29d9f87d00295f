//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `dashboard.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - TelemetryConfig: Where per-pot reading history lives and how long to wait for it.
//!     - PollingConfig: How often a monitoring session refreshes.
//!     - MetricsConfig: Which reading fields are shown and charted.
//!     - IdentityConfig: Where chat ids are resolved to pot ids.
//!     - ServerConfig: Dashboard bind address.
//!     - LoggingConfig: Per-reading log lines.
//!
//! every section (and every field) has a default, so a partial file is fine.
//!
//! ==============================================================================

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    pub telemetry: TelemetryConfig,
    pub polling: PollingConfig,
    pub metrics: MetricsConfig,
    pub identity: IdentityConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// device id is appended verbatim
    pub base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_seconds: u64,
    /// start monitoring as soon as the devices are known
    pub autostart: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub tracked: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct IdentityConfig {
    /// chat id is appended verbatim
    pub base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub show_readings: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-smart-plant.vercel.app/find/data/".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_seconds: 10, autostart: true }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { tracked: vec!["ph".to_string(), "soil".to_string()] }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-smart-pot-test.vercel.app/find/user/".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3000".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { show_readings: true }
    }
}

impl TelemetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl IdentityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl DashboardConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: DashboardConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            PathBuf::from("config").join("dashboard.toml"),
            PathBuf::from("..").join("config").join("dashboard.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "configuration loaded");
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %format!("{e:#}"),
                            "failed to load configuration"
                        );
                    }
                }
            }
        }

        tracing::warn!("no config file found, using defaults");
        Self::default()
    }

    /// reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.telemetry.base_url.trim().is_empty(), "telemetry.base_url must not be empty");
        ensure!(
            self.telemetry.timeout_seconds > 0,
            "telemetry.timeout_seconds must be greater than zero"
        );
        ensure!(
            self.polling.interval_seconds > 0,
            "polling.interval_seconds must be greater than zero"
        );
        ensure!(!self.metrics.tracked.is_empty(), "metrics.tracked must name at least one metric");
        ensure!(
            self.identity.timeout_seconds > 0,
            "identity.timeout_seconds must be greater than zero"
        );
        Ok(())
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        tracing::info!(
            telemetry = %self.telemetry.base_url,
            timeout_s = self.telemetry.timeout_seconds,
            interval_s = self.polling.interval_seconds,
            metrics = ?self.metrics.tracked,
            bind = %self.server.bind,
            "dashboard configuration"
        );
    }
}
