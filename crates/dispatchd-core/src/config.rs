//! Process-wide configuration: server bind address, pool sizes, the
//! routing table path, the job store path, and static API key
//! fixtures. Loaded from TOML with `#[serde(default = ...)]` per
//! field, the same shape as this codebase's other configuration
//! structs.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub pools: PoolConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub routing: RoutingConfigSection,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub identities: Vec<IdentityFixture>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pools: PoolConfig::default(),
            store: StoreConfig::default(),
            routing: RoutingConfigSection::default(),
            logging: LoggingConfig::default(),
            identities: default_identities(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::Config(format!("failed to read config file: {e}")))?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `DISPATCHD_CONFIG`, falling back to
    /// `./config/default.toml`, then compiled-in defaults.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = std::env::var("DISPATCHD_CONFIG") {
            return Self::load(&path);
        }
        if Path::new("./config/default.toml").exists() {
            return Self::load("./config/default.toml");
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("server port must be nonzero".to_string()));
        }
        if self.pools.devices.is_empty() {
            return Err(Error::Config("at least one execution pool must be configured".to_string()));
        }
        if !self.pools.devices.contains_key(&self.pools.default_pool) {
            return Err(Error::Config(format!(
                "default pool {:?} is not among the configured pools",
                self.pools.default_pool
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port(), max_body_bytes: default_max_body_bytes() }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    1_000_000
}

/// Per-device worker pool sizes plus which one unrouted models fall
/// back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_devices")]
    pub devices: HashMap<String, usize>,
    #[serde(default = "default_pool_name")]
    pub default_pool: String,
    /// Explicit `model:version -> pool` overrides, beyond the default.
    #[serde(default)]
    pub routes: HashMap<String, String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { devices: default_devices(), default_pool: default_pool_name(), routes: HashMap::new() }
    }
}

fn default_devices() -> HashMap<String, usize> {
    let mut m = HashMap::new();
    m.insert("cpu".to_string(), 8);
    m.insert("gpu".to_string(), 2);
    m
}

fn default_pool_name() -> String {
    "cpu".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

fn default_store_path() -> String {
    "./dispatchd.sqlite3".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfigSection {
    /// Path to a routing-table TOML file; if absent, the built-in
    /// fixture table is used (`echo`/`classifier`/`stable_model`).
    pub table_path: Option<String>,
}

impl Default for RoutingConfigSection {
    fn default() -> Self {
        Self { table_path: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { format: default_log_format() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

/// A static API-key fixture, the identity store this codebase's HTTP
/// boundary uses in place of a durable identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityFixture {
    pub api_key: String,
    pub tenant_id: String,
    pub scopes: Vec<String>,
}

fn default_identities() -> Vec<IdentityFixture> {
    vec![
        IdentityFixture {
            api_key: "dev-key".to_string(),
            tenant_id: "dev".to_string(),
            scopes: vec!["predict".to_string(), "read_models".to_string()],
        },
        IdentityFixture {
            api_key: "admin-key".to_string(),
            tenant_id: "admin".to_string(),
            scopes: vec!["predict".to_string(), "read_models".to_string(), "admin".to_string()],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_default_pool_not_present_in_devices() {
        let mut config = Config::default();
        config.pools.default_pool = "tpu".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
    }

    #[test]
    fn load_reads_a_config_file_from_disk() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[server]
port = 9090
"#)
        .unwrap();
        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 9090);
        // Fields left unset in the file still pick up their defaults.
        assert_eq!(config.pools.default_pool, "cpu");
    }

    #[test]
    fn load_rejects_an_invalid_config_file() {
        let err = Config::load("/nonexistent/path/to/dispatchd.toml").unwrap_err();
        assert_eq!(err.error_type(), "ConfigError");
    }
}
