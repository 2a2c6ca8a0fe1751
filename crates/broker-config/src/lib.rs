//! Layered configuration: built-in defaults, overridden by a `broker.toml`
//! file (path from `BROKER_CONFIG`, default `./broker.toml`), overridden in
//! turn by `BROKER_*` environment variables. Later layers win.
//!
//! Modeled on the file-then-merge shape of shipper's own config crate, with
//! the environment layer grounded on the `env::var` overrides shipper's own
//! CI-environment detection already uses.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_ENV: &str = "BROKER_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "broker.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, #[source] source: anyhow::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },
    #[error("{var} is not a valid value for this setting: {value}")]
    InvalidEnvValue { var: &'static str, value: String },
    #[error("no admin bootstrap password configured; set [bootstrap] admin_password in broker.toml or BROKER_BOOTSTRAP_ADMIN_PASSWORD")]
    MissingAdminPassword,
}

impl broker_types::ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "IO_ERROR",
            Self::Parse { .. } => "INVALID_INPUT",
            Self::InvalidEnvValue { .. } => "INVALID_INPUT",
            Self::MissingAdminPassword => "MISSING_ADMIN_PASSWORD",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    #[serde(default = "default_config_root")]
    pub config_root: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self { data_root: default_data_root(), config_root: default_config_root() }
    }
}

fn default_data_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_config_root() -> PathBuf {
    PathBuf::from("./config")
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DispatcherSection {
    #[serde(default = "default_tick_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,
    #[serde(default = "default_batch_max")]
    pub batch_max: usize,
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self { tick_interval_secs: default_tick_secs(), fan_out: default_fan_out(), batch_max: default_batch_max() }
    }
}

fn default_tick_secs() -> u64 {
    5
}
fn default_fan_out() -> usize {
    8
}
fn default_batch_max() -> usize {
    500
}

impl DispatcherSection {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeliverySection {
    #[serde(default = "default_delivery_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for DeliverySection {
    fn default() -> Self {
        Self { timeout_secs: default_delivery_timeout_secs(), max_attempts: default_max_attempts() }
    }
}

fn default_delivery_timeout_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    5
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSection {
    #[serde(default = "default_reconcile_secs")]
    pub interval_secs: u64,
}

impl Default for ReconciliationSection {
    fn default() -> Self {
        Self { interval_secs: default_reconcile_secs() }
    }
}

fn default_reconcile_secs() -> u64 {
    60
}

impl ReconciliationSection {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Bootstrap seeds the `$system`/`$management` control plane and one admin
/// user. `admin_password` has no compiled-in default: a broker started
/// without one fails fast at bootstrap rather than shipping a known
/// credential.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BootstrapSection {
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    #[serde(default)]
    pub admin_password: Option<String>,
}

fn default_admin_email() -> String {
    "admin@example.com".to_string()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub dispatcher: DispatcherSection,
    #[serde(default)]
    pub delivery: DeliverySection,
    #[serde(default)]
    pub reconciliation: ReconciliationSection,
    #[serde(default)]
    pub bootstrap: BootstrapSection,
}

impl BrokerConfig {
    pub fn admin_password(&self) -> Result<&str, ConfigError> {
        self.bootstrap.admin_password.as_deref().filter(|p| !p.is_empty()).ok_or(ConfigError::MissingAdminPassword)
    }
}

/// Resolves the config file path: `BROKER_CONFIG` if set, else
/// `./broker.toml`. A missing file is not an error; defaults apply.
pub fn config_file_path() -> PathBuf {
    env::var(CONFIG_FILE_ENV).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
}

pub fn load_from_file(path: &Path) -> Result<BrokerConfig, ConfigError> {
    if !path.exists() {
        return Ok(BrokerConfig::default());
    }
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read { path: path.to_path_buf(), source: e.into() })?;
    toml::from_str(&content).map_err(|e| ConfigError::Parse { path: path.to_path_buf(), source: e })
}

/// Loads the layered configuration: defaults, then the TOML file at
/// [`config_file_path`], then `BROKER_*` environment overrides.
pub fn load() -> Result<BrokerConfig, ConfigError> {
    let mut config = load_from_file(&config_file_path())?;
    apply_env_overrides(&mut config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut BrokerConfig) -> Result<(), ConfigError> {
    if let Some(value) = env_path("BROKER_DATA_ROOT") {
        config.storage.data_root = value;
    }
    if let Some(value) = env_path("BROKER_CONFIG_ROOT") {
        config.storage.config_root = value;
    }
    if let Some(value) = env_parsed::<u64>("BROKER_DISPATCHER_TICK_SECS")? {
        config.dispatcher.tick_interval_secs = value;
    }
    if let Some(value) = env_parsed::<usize>("BROKER_DISPATCHER_FAN_OUT")? {
        config.dispatcher.fan_out = value;
    }
    if let Some(value) = env_parsed::<usize>("BROKER_DISPATCHER_BATCH_MAX")? {
        config.dispatcher.batch_max = value;
    }
    if let Some(value) = env_parsed::<u64>("BROKER_DELIVERY_TIMEOUT_SECS")? {
        config.delivery.timeout_secs = value;
    }
    if let Some(value) = env_parsed::<u32>("BROKER_DELIVERY_MAX_ATTEMPTS")? {
        config.delivery.max_attempts = value;
    }
    if let Some(value) = env_parsed::<u64>("BROKER_RECONCILE_INTERVAL_SECS")? {
        config.reconciliation.interval_secs = value;
    }
    if let Ok(value) = env::var("BROKER_BOOTSTRAP_ADMIN_EMAIL") {
        config.bootstrap.admin_email = value;
    }
    if let Ok(value) = env::var("BROKER_BOOTSTRAP_ADMIN_PASSWORD") {
        config.bootstrap.admin_password = Some(value);
    }
    Ok(())
}

fn env_path(var: &'static str) -> Option<PathBuf> {
    env::var(var).ok().map(PathBuf::from)
}

fn env_parsed<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value.parse::<T>().map(Some).map_err(|_| ConfigError::InvalidEnvValue { var, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn defaults_apply_when_file_missing() {
        let config = load_from_file(Path::new("/nonexistent/broker.toml")).expect("defaults");
        assert_eq!(config.dispatcher.fan_out, 8);
        assert_eq!(config.delivery.max_attempts, 5);
        assert_eq!(config.bootstrap.admin_email, "admin@example.com");
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("broker.toml");
        let mut file = std::fs::File::create(&path).expect("create");
        writeln!(file, "[dispatcher]\nfan_out = 16\n").expect("write");

        let config = load_from_file(&path).expect("load");
        assert_eq!(config.dispatcher.fan_out, 16);
        assert_eq!(config.dispatcher.batch_max, 500);
    }

    #[test]
    fn admin_password_missing_by_default() {
        let config = BrokerConfig::default();
        assert!(matches!(config.admin_password(), Err(ConfigError::MissingAdminPassword)));
    }

    #[test]
    fn env_override_beats_file_value() {
        temp_env::with_var("BROKER_DISPATCHER_FAN_OUT", Some("3"), || {
            let mut config = BrokerConfig { dispatcher: DispatcherSection { fan_out: 8, ..Default::default() }, ..Default::default() };
            apply_env_overrides(&mut config).expect("apply");
            assert_eq!(config.dispatcher.fan_out, 3);
        });
    }

    #[test]
    fn invalid_env_value_is_reported() {
        temp_env::with_var("BROKER_DISPATCHER_FAN_OUT", Some("not-a-number"), || {
            let mut config = BrokerConfig::default();
            let err = apply_env_overrides(&mut config).expect_err("should fail");
            assert!(matches!(err, ConfigError::InvalidEnvValue { var: "BROKER_DISPATCHER_FAN_OUT", .. }));
        });
    }
}
