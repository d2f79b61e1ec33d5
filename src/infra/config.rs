//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::services::geodesic::{DistanceMode, DistanceModel, DistanceSettings};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Label attached to exported metrics
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "roadlife".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Directory of GeoJSON reference lines, one file per road
    #[serde(default = "default_roads_dir")]
    pub roads_dir: String,
    /// CSV table of postcode, latitude, longitude
    #[serde(default = "default_postcodes_file")]
    pub postcodes_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { roads_dir: default_roads_dir(), postcodes_file: default_postcodes_file() }
    }
}

fn default_roads_dir() -> String {
    "static/roads".to_string()
}

fn default_postcodes_file() -> String {
    "static/postcodes.csv".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub distance_model: DistanceModel,
    #[serde(default)]
    pub distance_mode: DistanceMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Requests with a larger body are rejected with 413
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_server_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    #[serde(default)]
    pub enabled: bool,
    /// File path for report egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { enabled: false, file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "reports.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    roads_dir: String,
    postcodes_file: String,
    distance_model: DistanceModel,
    distance_mode: DistanceMode,
    bind_address: String,
    port: u16,
    max_body_bytes: usize,
    metrics_interval_secs: u64,
    egress_enabled: bool,
    egress_file: String,
    log_format: LogFormat,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            site_id: toml_config.site.id,
            roads_dir: toml_config.data.roads_dir,
            postcodes_file: toml_config.data.postcodes_file,
            distance_model: toml_config.engine.distance_model,
            distance_mode: toml_config.engine.distance_mode,
            bind_address: toml_config.server.bind_address,
            port: toml_config.server.port,
            max_body_bytes: toml_config.server.max_body_bytes,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            egress_enabled: toml_config.egress.enabled,
            egress_file: toml_config.egress.file,
            log_format: toml_config.logging.format,
            config_file: config_file.to_string(),
        }
    }

    /// Config file path: explicit `--config` value, else `CONFIG_FILE`, else
    /// `config/dev.toml`
    pub fn resolve_config_path(explicit: Option<&str>) -> String {
        if let Some(path) = explicit {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn roads_dir(&self) -> &str {
        &self.roads_dir
    }

    pub fn postcodes_file(&self) -> &str {
        &self.postcodes_file
    }

    pub fn distance_settings(&self) -> DistanceSettings {
        DistanceSettings { model: self.distance_model, mode: self.distance_mode }
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn egress_enabled(&self) -> bool {
        self.egress_enabled
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
