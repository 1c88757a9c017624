//! Hierarchical configuration loading: `config.toml` (base) overlaid by
//! `config.local.toml` (git-ignored local overrides) overlaid by
//! `GRIZZLY_*`-prefixed environment variables, `__`-nested for sub-tables.
//!
//! ```toml
//! # config.toml
//! [storage]
//! data_dir = "./data"
//!
//! [optimizer]
//! index_selection_enabled = true
//! ```
//! ```bash
//! GRIZZLY_STORAGE__DATA_DIR=/custom/path
//! GRIZZLY_SCHEDULER__TICK_INTERVAL_MS=500
//! ```

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub default_database: String,
    #[serde(default = "default_true")]
    pub auto_create_databases: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: PathBuf::from("./data"),
            default_database: "default".to_string(),
            auto_create_databases: true,
        }
    }
}

/// Knobs for the optimizer's rewrite rules, primarily useful for tests and
/// benchmarks that want to compare a plan with a rule disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_true")]
    pub projection_pushdown_enabled: bool,
    #[serde(default = "default_true")]
    pub index_selection_enabled: bool,
    #[serde(default = "default_cardinality_threshold")]
    pub hyperloglog_threshold: usize,
}

fn default_cardinality_threshold() -> usize {
    512
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            projection_pushdown_enabled: true,
            index_selection_enabled: true,
            hyperloglog_threshold: default_cardinality_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            tick_interval_ms: default_tick_interval_ms(),
            default_max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig::default(),
            optimizer: OptimizerConfig::default(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Merge `config.toml`, `config.local.toml`, then `GRIZZLY_*` env vars,
    /// in that order of increasing precedence.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("GRIZZLY_").split("__"))
            .extract()
    }

    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("GRIZZLY_").split("__"))
            .extract()
    }
}

/// Installs a global `tracing` subscriber from `logging`. Safe to call more
/// than once per process only in tests (`try_init` swallows the "already
/// set" error); production callers should call this exactly once at
/// startup.
pub fn init_tracing(logging: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if logging.format == "json" {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sensible_storage_values() {
        let config = Config::default();
        assert_eq!(config.storage.default_database, "default");
        assert_eq!(config.optimizer.hyperloglog_threshold, 512);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("[optimizer]"));
        assert!(toml_str.contains("[scheduler]"));
    }
}
