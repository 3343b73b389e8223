//! Error types and handling
//!
//! This module provides the error types used throughout the Steward engine.
//! All errors implement the `StewardErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.

use thiserror::Error;

/// Trait for Steward error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait StewardErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain
    /// internal implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors typically require reconfiguration or operator intervention.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// This enum represents all possible errors that can occur in the Steward
/// engine.
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Storage**: Memory persistence backend failures
/// - **File System**: Virtual file table lookups
/// - **Plugin**: Registry lookups and handler failures
/// - **Execution**: Step dispatch and orchestrator lifecycle errors
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, StewardErrorExt};
///
/// let error = EngineError::PluginDisabled("code-analysis".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::NotInitialized;
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Persistence backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Virtual file system errors
    #[error("File not found: {0}")]
    FileNotFound(String),

    // Plugin errors
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Plugin disabled: {0}")]
    PluginDisabled(String),

    #[error("Plugin error: {0}")]
    Plugin(String),

    // Step execution errors
    #[error("Unknown action type: {0}")]
    UnknownAction(String),

    // Orchestrator lifecycle errors
    #[error("Agent not initialized")]
    NotInitialized,

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StewardErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",

            // Persistence backend errors
            Self::Storage(_) => "Memory persistence failed. Check the data directory",

            // Virtual file system errors
            Self::FileNotFound(_) => "The requested file is not tracked by the scanner",

            // Plugin errors
            Self::PluginNotFound(_) => "The requested plugin is not registered",
            Self::PluginDisabled(_) => "Plugin is disabled. Enable it before use",
            Self::Plugin(_) => "Plugin execution failed. Check plugin logs",

            // Step execution errors
            Self::UnknownAction(_) => "No handler exists for this action type",

            // Orchestrator lifecycle errors
            Self::NotInitialized => "Call initialize() before submitting tasks",

            // Serialization errors
            Self::Serialization(_) => "Stored state is malformed or incompatible",

            // Generic IO error
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::NotInitialized | Self::Config(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
