//! Configuration management
//!
//! This module handles loading, validation, and management of the Steward
//! configuration. Configuration is stored in TOML format at
//! ~/.steward/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Workspace label, log level, data directory
//! - **agent**: Operation mode, autonomy level, component enablement,
//!   approval timeout
//! - **memory**: Persistence slot naming
//!
//! # Path Expansion
//!
//! The configuration system automatically:
//! - Expands ~ to the user's home directory
//! - Creates the data directory if it doesn't exist
//!
//! # Examples
//!
//! ```no_run
//! use steward_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Mode: {:?}", config.agent.mode);
//! println!("Autonomy: {:?}", config.agent.autonomy);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Operation mode the agent runs under
///
/// The mode selects the approval notification channel: web mode feeds a
/// host event channel, api and background modes log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Web,
    Api,
    Background,
}

/// Autonomy level governing approval requirements
///
/// - `Full`: auto-approve low and medium risk plans
/// - `Semi`: auto-approve only low risk plans
/// - `Interactive`: every plan requires human approval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutonomyLevel {
    Full,
    Semi,
    Interactive,
}

/// Main configuration structure
///
/// Represents the complete Steward configuration loaded from
/// ~/.steward/config.toml. Every field has a default so a missing or
/// partial file still produces a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Agent behavior settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Memory persistence settings
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Root label for the virtual workspace (None disables the scanner)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

/// Agent behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Operation mode (web, api, background)
    #[serde(default = "default_mode")]
    pub mode: OperationMode,

    /// Autonomy level (full, semi, interactive)
    #[serde(default = "default_autonomy")]
    pub autonomy: AutonomyLevel,

    /// Enable the vector memory component
    #[serde(default = "default_true")]
    pub memory_enabled: bool,

    /// Enable the plugin registry
    #[serde(default = "default_true")]
    pub plugins_enabled: bool,

    /// Upper bound on step iterations per task
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Approval wait deadline in milliseconds
    #[serde(default = "default_approval_timeout_ms")]
    pub approval_timeout_ms: u64,

    /// URL of the site this agent manages (stamped into task context)
    #[serde(default = "default_website_url")]
    pub website_url: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            autonomy: default_autonomy(),
            memory_enabled: true,
            plugins_enabled: true,
            max_iterations: default_max_iterations(),
            approval_timeout_ms: default_approval_timeout_ms(),
            website_url: default_website_url(),
        }
    }
}

/// Memory persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Slot name for the persisted memory blob under data_dir/memory/
    #[serde(default = "default_persist_key")]
    pub persist_key: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            persist_key: default_persist_key(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.steward")
}

fn default_mode() -> OperationMode {
    OperationMode::Api
}

fn default_autonomy() -> AutonomyLevel {
    AutonomyLevel::Semi
}

fn default_true() -> bool {
    true
}

fn default_max_iterations() -> usize {
    10
}

fn default_approval_timeout_ms() -> u64 {
    300_000
}

fn default_website_url() -> String {
    "http://localhost".to_string()
}

fn default_persist_key() -> String {
    "steward_memory".to_string()
}

impl Config {
    /// Load the configuration from the default location, creating a default
    /// file if none exists.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let path = Self::config_path()?;

        if !path.exists() {
            let config = Config::default();
            config.save(&path)?;
            return config.finalize();
        }

        Self::load(&path)
    }

    /// Load the configuration from an explicit path.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {}", path.display(), e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("cannot parse {}: {}", path.display(), e)))?;

        config.finalize()
    }

    /// Write the configuration to the given path, creating parent
    /// directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("cannot serialize config: {}", e)))?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Default configuration file location (~/.steward/config.toml).
    pub fn config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("cannot determine home directory".to_string()))?;
        Ok(home.join(".steward").join("config.toml"))
    }

    /// Expand paths and create the data directory.
    fn finalize(mut self) -> Result<Self, EngineError> {
        self.core.data_dir = expand_tilde(&self.core.data_dir)?;
        fs::create_dir_all(&self.core.data_dir)?;
        Ok(self)
    }

    /// Resolved location of the memory persistence slot.
    pub fn memory_store_path(&self) -> PathBuf {
        self.core
            .data_dir
            .join("memory")
            .join(format!("{}.json", self.memory.persist_key))
    }
}

/// Expand a leading ~ to the user's home directory.
fn expand_tilde(path: &Path) -> Result<PathBuf, EngineError> {
    let Some(s) = path.to_str() else {
        return Ok(path.to_path_buf());
    };

    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("cannot determine home directory".to_string()))?;
        return Ok(home.join(rest));
    }

    if s == "~" {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("cannot determine home directory".to_string()))?;
        return Ok(home);
    }

    Ok(path.to_path_buf())
}
