//! Layered configuration: built-in defaults, an optional config file, then
//! environment variable overrides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Where tracing output goes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoggingOutput {
    /// Console (stderr) only.
    Stderr,
    /// Rolling file only.
    File,
    /// Console and file (default).
    #[default]
    Both,
}

/// Logging knobs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Destination(s) for log output.
    #[serde(default)]
    pub output: LoggingOutput,
    /// Level for console output, when `output` includes it.
    pub console_level: Option<String>,
    /// Level for file output, when `output` includes it.
    pub file_level: Option<String>,
}

/// One entry of the `etc/services.json` service-discovery schema:
/// `{Host, Port, Url, Size, Hot, Parallel, Timeout, Http, Https}`. Kept as a
/// config surface for deployment tooling even though this crate's own
/// process topology is resolved via `--team <addr>`/`--solo`/`--mono`
/// directly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceEntry {
    /// Host the service listens on.
    pub host: Option<String>,
    /// Port the service listens on.
    pub port: Option<u16>,
    /// Fully-qualified URL, when the service is addressed by URL instead.
    pub url: Option<String>,
    /// Pool size hint.
    pub size: Option<u32>,
    /// Whether this service entry should be treated as hot-reloadable.
    pub hot: Option<bool>,
    /// Parallelism hint.
    pub parallel: Option<u32>,
    /// Request timeout, in milliseconds.
    pub timeout: Option<u64>,
    /// Whether plain HTTP is accepted.
    pub http: Option<bool>,
    /// Whether HTTPS is accepted.
    pub https: Option<bool>,
}

/// MongoDB connection settings, used when the `mongodb` feature is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    /// Connection URI, e.g. `mongodb://localhost:27017`.
    pub uri: String,
    /// Database name holding the `waypoint`/`truck` collections.
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "dispatch".to_string(),
        }
    }
}

/// Top-level settings, derived from a config file with env var overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Host the HTTP/WebSocket edge binds to.
    pub listen_host: String,
    /// Port the HTTP/WebSocket edge binds to.
    pub listen_port: u16,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// MongoDB connection settings (used unless an in-memory store is
    /// requested for local development).
    #[serde(default)]
    pub mongodb: MongoConfig,
    /// The `etc/services.json` service-discovery map, keyed by service name.
    #[serde(default)]
    pub services: HashMap<String, ServiceEntry>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_host: "127.0.0.1".to_string(),
            listen_port: 8420,
            logging: LoggingConfig::default(),
            mongodb: MongoConfig::default(),
            services: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load defaults, layer the config file named by `config_file_name` (or
    /// `<work_dir>/config.toml` when `None`) over them, then layer env var
    /// overrides (prefix `DISPATCHD_`, `__` as the nesting separator, e.g.
    /// `DISPATCHD_MONGODB__URI`) on top.
    pub fn load(work_dir: &Path, config_file_name: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config_path = config_file_name.unwrap_or_else(|| work_dir.join("config.toml"));
        let default_settings = Self::default();

        let mut builder = Config::builder().add_source(Config::try_from(&default_settings)?);
        if config_path.exists() {
            builder = builder.add_source(File::from(config_path));
        } else {
            tracing::info!("config file not found, using defaults and env vars");
        }
        builder = builder.add_source(Environment::with_prefix("DISPATCHD").separator("__"));

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_a_config_file() {
        let work_dir = std::env::temp_dir().join("dispatchd-config-test-no-file");
        let settings = Settings::load(&work_dir, None).unwrap();
        assert_eq!(settings.listen_host, "127.0.0.1");
        assert_eq!(settings.listen_port, 8420);
        assert_eq!(settings.logging.output, LoggingOutput::Both);
        assert!(settings.services.is_empty());
    }

    #[test]
    fn services_json_schema_round_trips() {
        let entry = ServiceEntry {
            host: Some("127.0.0.1".to_string()),
            port: Some(9001),
            url: None,
            size: Some(4),
            hot: Some(true),
            parallel: Some(2),
            timeout: Some(5_000),
            http: Some(true),
            https: Some(false),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["Host"], "127.0.0.1");
        assert_eq!(json["Parallel"], 2);
    }
}
