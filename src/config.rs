//! Run configuration for hal-sim.
//!
//! Configuration is assembled from several sources, lowest priority first:
//! 1. Built-in defaults
//! 2. Project-local config file (`./hal-sim.json`)
//! 3. A config file named explicitly (`--config`)
//! 4. Environment variables (`HAL_PORT_CAPACITY`, `HAL_IO_TIMEOUT_MS`,
//!    `HAL_MAX_CYCLES`, `HAL_TRACE`)
//!
//! Command-line flags are applied on top by the binary.
//!
//! # Config File Format
//!
//! ```json
//! {
//!   "port_capacity": 2,
//!   "io_timeout_ms": 10000,
//!   "max_cycles": null,
//!   "trace": false
//! }
//! ```
//!
//! Every field is optional. An `io_timeout_ms` of `0` disables the timeout.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cpu::UnitOptions;
use crate::net::DEFAULT_CAPACITY;

/// Name of the project-local config file.
pub const LOCAL_CONFIG_FILE: &str = "hal-sim.json";

/// Default bound on a single blocking IN/OUT.
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 10_000;

/// Settings for one simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of values each port buffers.
    pub port_capacity: usize,

    /// Longest a single IN or OUT may block, in milliseconds.
    /// `None` (or `0` in files and the environment) waits forever.
    pub io_timeout_ms: Option<u64>,

    /// Fault a unit after this many instructions without STOP.
    pub max_cycles: Option<u64>,

    /// Dump registers before and after every step.
    pub trace: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            port_capacity: DEFAULT_CAPACITY,
            io_timeout_ms: Some(DEFAULT_IO_TIMEOUT_MS),
            max_cycles: None,
            trace: false,
        }
    }
}

/// Partially specified config, as read from a file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    port_capacity: Option<usize>,
    io_timeout_ms: Option<u64>,
    max_cycles: Option<u64>,
    trace: Option<bool>,
}

impl SimConfig {
    /// Load configuration from defaults, the local file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Like [`SimConfig::load`], with an extra file layered above the local one.
    pub fn load_with(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let local = Path::new(LOCAL_CONFIG_FILE);
        if local.exists() {
            config.merge_file(local)?;
        }

        if let Some(path) = explicit {
            config.merge_file(path)?;
        }

        config.apply_env_overrides()?;
        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Read a config file on its own, on top of the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.merge_file(path)?;
        Ok(config)
    }

    /// Parse a config from JSON text, on top of the defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(text)
            .map_err(|e| ConfigError::Parse { source_name: "<inline>".into(), message: e.to_string() })?;
        let mut config = Self::default();
        config.merge(file);
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io { path: path.display().to_string(), message: e.to_string() })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::Parse { source_name: path.display().to_string(), message: e.to_string() })?;
        log::info!("Loaded config from {}", path.display());
        self.merge(file);
        Ok(())
    }

    /// Only overrides fields present in `other`.
    fn merge(&mut self, other: ConfigFile) {
        if let Some(capacity) = other.port_capacity {
            self.port_capacity = capacity;
        }
        if let Some(ms) = other.io_timeout_ms {
            self.io_timeout_ms = (ms > 0).then_some(ms);
        }
        if other.max_cycles.is_some() {
            self.max_cycles = other.max_cycles;
        }
        if let Some(trace) = other.trace {
            self.trace = trace;
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(capacity) = env_number("HAL_PORT_CAPACITY")? {
            log::info!("Using HAL_PORT_CAPACITY from environment: {}", capacity);
            self.port_capacity = capacity as usize;
        }
        if let Some(ms) = env_number("HAL_IO_TIMEOUT_MS")? {
            log::info!("Using HAL_IO_TIMEOUT_MS from environment: {}", ms);
            self.io_timeout_ms = (ms > 0).then_some(ms);
        }
        if let Some(cycles) = env_number("HAL_MAX_CYCLES")? {
            log::info!("Using HAL_MAX_CYCLES from environment: {}", cycles);
            self.max_cycles = Some(cycles);
        }
        if let Ok(value) = std::env::var("HAL_TRACE") {
            self.trace = matches!(value.trim(), "1" | "true" | "yes" | "on");
        }
        Ok(())
    }

    /// The IN/OUT timeout as a duration.
    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_ms.map(Duration::from_millis)
    }

    /// Options handed to every unit.
    pub fn unit_options(&self) -> UnitOptions {
        UnitOptions {
            io_timeout: self.io_timeout(),
            max_cycles: self.max_cycles,
            trace: self.trace,
        }
    }
}

fn env_number(name: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::Parse { source_name: name.to_string(), message: e.to_string() }),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid config in {source_name}: {message}")]
    Parse { source_name: String, message: String },
}
