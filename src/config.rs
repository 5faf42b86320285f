//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - deltaplan.toml (default configuration)
//! - deltaplan.local.toml (git-ignored local overrides)
//! - Environment variables (DELTAPLAN_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # deltaplan.toml
//! [optimizer]
//! incrementalize = true
//! simplify_functions = true
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! DELTAPLAN_OPTIMIZER__INCREMENTALIZE=true
//! DELTAPLAN_LOGGING__LEVEL=trace
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Circuit optimizer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Rewrite the circuit to consume and produce deltas
    #[serde(default)]
    pub incrementalize: bool,

    /// Beta-reduce and simplify every function embedded in an operator
    #[serde(default = "default_true")]
    pub simplify_functions: bool,

    /// Run the optimization passes. When false only incrementalization runs.
    #[serde(default = "default_true")]
    pub optimize: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl CompilerConfig {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. deltaplan.toml (base configuration)
    /// 2. deltaplan.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (DELTAPLAN_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(CompilerConfig::default()))
            .merge(Toml::file("deltaplan.toml"))
            .merge(Toml::file("deltaplan.local.toml"))
            .merge(Env::prefixed("DELTAPLAN_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(CompilerConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("DELTAPLAN_").split("__"))
            .extract()
    }

    /// Parse configuration from TOML text, without environment overrides
    pub fn from_toml(text: &str) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(CompilerConfig::default()))
            .merge(Toml::string(text))
            .extract()
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            incrementalize: false,
            simplify_functions: default_true(),
            optimize: default_true(),
        }
    }
}

impl OptimizerConfig {
    /// Default configuration with incrementalization on
    pub fn incremental() -> Self {
        OptimizerConfig {
            incrementalize: true,
            ..OptimizerConfig::default()
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
