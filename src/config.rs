//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - built-in defaults
//! - relalg.toml (project configuration)
//! - relalg.local.toml (git-ignored local overrides)
//! - Environment variables (RELALG_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # relalg.toml
//! [optimizer]
//! phases = "IPDJTI"
//! max_iterations = 10
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! RELALG_OPTIMIZER__PHASES=JI
//! RELALG_OPTIMIZER__NODE_GUARD=50000
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Phase sequencing and fixpoint limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Phase letters run left to right (see [`crate::optimizer::Phase`])
    #[serde(default = "default_phases")]
    pub phases: String,

    /// Cap on the outer fixpoint rounds of the join pushdown and
    /// theta-join phases
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Stop between phases once the plan has more reachable nodes than this
    #[serde(default)]
    pub node_guard: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "relalg_opt=debug"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Write events to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_phases() -> String {
    "IPDJTI".to_string()
}
fn default_max_iterations() -> usize {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            phases: default_phases(),
            max_iterations: default_max_iterations(),
            node_guard: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from the default locations
    ///
    /// Merges in order:
    /// 1. built-in defaults
    /// 2. relalg.toml
    /// 3. relalg.local.toml (local overrides, git-ignored)
    /// 4. Environment variables (RELALG_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(Path::new("."))
    }

    /// Load configuration with the TOML files looked up in `dir`
    pub fn load_from(dir: &Path) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(dir.join("relalg.toml")))
            .merge(Toml::file(dir.join("relalg.local.toml")))
            .merge(Env::prefixed("RELALG_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &Path) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("RELALG_").split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.optimizer.phases, "IPDJTI");
        assert_eq!(config.optimizer.max_iterations, 10);
        assert_eq!(config.optimizer.node_guard, None);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[optimizer]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let mut config = Config::default();
        config.optimizer.node_guard = Some(500);
        let toml_str = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[optimizer]\nphases = \"JI\"\n").unwrap();
        assert_eq!(config.optimizer.phases, "JI");
        assert_eq!(config.optimizer.max_iterations, 10);
        assert_eq!(config.logging, LoggingConfig::default());
    }
}
