//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (IOC_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [solver]
//! default_mode = "balanced"
//! max_optimizer_iterations = 8
//!
//! [profiler]
//! file_path = ".ioc_profile"
//! ema_alpha = 0.30
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! IOC_SOLVER__DEFAULT_MODE=speed
//! IOC_PROFILER__FILE_PATH=/var/lib/ioc/profile.json
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::solver::OptimizationMode;

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub profiler: ProfilerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Solver-kernel tuning (`SPEC_FULL.md` §2, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Mode used by `Graph::compile` when the caller doesn't pick one.
    #[serde(default = "default_mode")]
    pub default_mode: OptimizationMode,

    /// Upper bound on how many times the rewriting optimizer's fixed
    /// pipeline may be re-run to reach a fixed point before giving up and
    /// returning the graph as-is.
    #[serde(default = "default_max_optimizer_iterations")]
    pub max_optimizer_iterations: usize,

    /// Capacity hint for the `(NodeId, size bucket, mode)` strategy
    /// decision cache.
    #[serde(default = "default_decision_cache_capacity")]
    pub decision_cache_capacity: usize,
}

/// Cost-model profiler persistence settings (`SPEC_FULL.md` §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Where the profile file lives when not overridden by the caller.
    #[serde(default = "default_profile_file_path")]
    pub file_path: PathBuf,

    /// EMA smoothing weight applied to each new sample.
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_mode() -> OptimizationMode {
    OptimizationMode::Balanced
}
fn default_max_optimizer_iterations() -> usize {
    8
}
fn default_decision_cache_capacity() -> usize {
    1024
}
fn default_profile_file_path() -> PathBuf {
    PathBuf::from(crate::profiler::DEFAULT_PROFILE_FILE)
}
fn default_ema_alpha() -> f64 {
    crate::profiler::ALPHA
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (IOC_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("IOC_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("IOC_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            solver: SolverConfig::default(),
            profiler: ProfilerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            default_mode: default_mode(),
            max_optimizer_iterations: default_max_optimizer_iterations(),
            decision_cache_capacity: default_decision_cache_capacity(),
        }
    }
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        ProfilerConfig {
            file_path: default_profile_file_path(),
            ema_alpha: default_ema_alpha(),
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
