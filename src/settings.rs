//! Configuration management for gopt.
//!
//! Program behavior that rarely changes between runs (how Gaussian is
//! started, how success is recognized, default retry limits) lives in
//! INI-format configuration files, searched with the following precedence:
//!
//! 1. Local configuration (`./gopt_config.cfg`)
//! 2. User configuration (`~/.config/gopt/gopt_config.cfg`)
//! 3. System configuration (`/etc/gopt/gopt_config.cfg`)
//! 4. Built-in defaults
//!
//! # Configuration File Format
//!
//! ```ini
//! [engine]
//! command = g16
//! termination_marker = Normal termination of Gaussian
//! tail_lines = 10
//!
//! [optimization]
//! opt_steps = 8
//! max_retries = 20
//!
//! [logging]
//! level = info
//! ```
//!
//! # Usage
//!
//! ```rust
//! use gopt::settings::SettingsManager;
//!
//! let settings = SettingsManager::load()?;
//! println!("Gaussian command: {}", settings.engine().command);
//! # Ok::<(), gopt::settings::ConfigError>(())
//! ```

use crate::engine::{DEFAULT_TAIL_LINES, NORMAL_TERMINATION};
use configparser::ini::Ini;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file looked up in each location.
pub const CONFIG_FILE_NAME: &str = "gopt_config.cfg";

/// Errors that can occur during configuration loading and processing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error when reading configuration files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// INI parsing error
    #[error("INI parsing error: {0}")]
    IniParse(String),
    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Main configuration structure containing all program settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Settings {
    /// How Gaussian is invoked and judged
    pub engine: EngineSettings,
    /// Optimization restart defaults
    pub optimization: OptimizationSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Engine invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineSettings {
    /// Shell command that reads a job on stdin (default: "g16")
    pub command: String,
    /// Text marking a successful run (default: "Normal termination of Gaussian")
    pub termination_marker: String,
    /// Trailing log lines searched for the marker (default: 10)
    pub tail_lines: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            command: "g16".to_string(),
            termination_marker: NORMAL_TERMINATION.to_string(),
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }
}

/// Optimization restart settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptimizationSettings {
    /// Optimization cycles per submission (default: 8)
    pub opt_steps: u32,
    /// Recovery submissions allowed per optimization job (default: 20)
    /// 0 = unlimited
    pub max_retries: u32,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            opt_steps: 8,
            max_retries: 20,
        }
    }
}

/// Logging configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Log level (default: "info")
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

type Section = HashMap<String, Option<String>>;

/// Configuration manager that handles loading and accessing program settings.
pub struct SettingsManager {
    settings: Settings,
    config_source: String,
}

impl SettingsManager {
    /// Loads configuration from the standard locations.
    ///
    /// Files that exist but fail to load are reported with `warn!` and
    /// skipped; the remaining layers still apply.
    pub fn load() -> Result<Self, ConfigError> {
        let mut paths = Vec::new();
        if let Some(system_path) = Self::get_system_config_path() {
            paths.push(system_path);
        }
        if let Some(user_path) = Self::get_user_config_path() {
            paths.push(user_path);
        }
        paths.push(PathBuf::from(CONFIG_FILE_NAME));
        Ok(Self::load_layers(&paths))
    }

    /// Loads a single configuration file on top of the built-in defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let mut settings = Settings::default();
        Self::apply(&mut settings, &content)?;
        Ok(Self {
            settings,
            config_source: format!("{}", path.display()),
        })
    }

    /// Built-in defaults only.
    pub fn defaults() -> Self {
        Self {
            settings: Settings::default(),
            config_source: "built-in defaults".to_string(),
        }
    }

    /// Returns the source of the loaded configuration.
    pub fn config_source(&self) -> &str {
        &self.config_source
    }

    /// Gets a reference to the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Gets the engine settings.
    pub fn engine(&self) -> &EngineSettings {
        &self.settings.engine
    }

    /// Gets the optimization settings.
    pub fn optimization(&self) -> &OptimizationSettings {
        &self.settings.optimization
    }

    /// Gets the logging settings.
    pub fn logging(&self) -> &LoggingSettings {
        &self.settings.logging
    }

    /// Applies existing files in order, later files overriding earlier ones.
    fn load_layers(paths: &[PathBuf]) -> Self {
        let mut manager = Self::defaults();

        for path in paths.iter().filter(|path| path.exists()) {
            let applied = fs::read_to_string(path)
                .map_err(ConfigError::from)
                .and_then(|content| Self::apply(&mut manager.settings, &content));
            match applied {
                Ok(()) => {
                    manager.config_source = format!("{}", path.display());
                    debug!("Loaded configuration from: {}", path.display());
                }
                Err(e) => {
                    warn!("Failed to load config from {}: {}", path.display(), e);
                }
            }
        }

        manager
    }

    /// Parses INI text and overrides the keys it sets.
    ///
    /// `settings` is only modified if the whole file is valid.
    fn apply(settings: &mut Settings, content: &str) -> Result<(), ConfigError> {
        let mut ini = Ini::new();
        ini.read(content.to_string())
            .map_err(|e| ConfigError::IniParse(format!("Failed to parse INI: {}", e)))?;

        let mut updated = settings.clone();
        let map = ini.get_map_ref();

        if let Some(engine_map) = map.get("engine") {
            Self::parse_engine(engine_map, &mut updated.engine)?;
        }
        if let Some(optimization_map) = map.get("optimization") {
            Self::parse_optimization(optimization_map, &mut updated.optimization)?;
        }
        if let Some(logging_map) = map.get("logging") {
            Self::parse_logging(logging_map, &mut updated.logging)?;
        }

        *settings = updated;
        Ok(())
    }

    fn parse_engine(section: &Section, engine: &mut EngineSettings) -> Result<(), ConfigError> {
        if let Some(Some(command)) = section.get("command") {
            engine.command = command.clone();
        }
        if let Some(Some(marker)) = section.get("termination_marker") {
            engine.termination_marker = marker.clone();
        }
        if let Some(Some(tail_lines)) = section.get("tail_lines") {
            engine.tail_lines = match tail_lines.parse() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue(format!(
                        "Invalid tail_lines: {}",
                        tail_lines
                    )))
                }
            };
        }
        Ok(())
    }

    fn parse_optimization(
        section: &Section,
        optimization: &mut OptimizationSettings,
    ) -> Result<(), ConfigError> {
        if let Some(Some(opt_steps)) = section.get("opt_steps") {
            optimization.opt_steps = match opt_steps.parse() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue(format!(
                        "Invalid opt_steps: {}",
                        opt_steps
                    )))
                }
            };
        }
        if let Some(Some(max_retries)) = section.get("max_retries") {
            optimization.max_retries = max_retries.parse().map_err(|_| {
                ConfigError::InvalidValue(format!("Invalid max_retries: {}", max_retries))
            })?;
        }
        Ok(())
    }

    fn parse_logging(section: &Section, logging: &mut LoggingSettings) -> Result<(), ConfigError> {
        if let Some(Some(level)) = section.get("level") {
            if level.parse::<log::LevelFilter>().is_err() {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid log level: {}",
                    level
                )));
            }
            logging.level = level.clone();
        }
        Ok(())
    }

    /// Gets the user configuration file path.
    fn get_user_config_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("gopt")
                .join(CONFIG_FILE_NAME)
        })
    }

    /// Gets the system configuration file path.
    fn get_system_config_path() -> Option<PathBuf> {
        if cfg!(unix) {
            Some(PathBuf::from("/etc/gopt").join(CONFIG_FILE_NAME))
        } else {
            None
        }
    }
}
