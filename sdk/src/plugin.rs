//! Plugin trait and metadata types
//!
//! This module defines the `PluginHandler` trait that every plugin entry
//! point must implement, plus the metadata and configuration records the
//! registry keeps alongside each handler.

use crate::errors::EngineError;
use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};

/// Static description of a plugin capability
///
/// Registered once per plugin and immutable afterwards. Capabilities and
/// required permissions are free-form tags the host can match against its
/// own policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub id: String,
    pub name: String,
    pub version: Version,
    pub description: String,
    pub author: String,
    pub capabilities: Vec<String>,
    pub required_permissions: Vec<String>,
}

/// Mutable per-plugin configuration
///
/// `settings` is a free-form JSON object; updates are shallow-merged, never
/// replaced wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    pub enabled: bool,
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settings: serde_json::Map::new(),
        }
    }
}

/// Trait that all plugin entry points must implement
///
/// Handlers receive a loosely-typed JSON parameter object and return
/// whatever JSON value they produce. A handler error propagates unmodified
/// to the caller's step-failure path.
#[async_trait]
pub trait PluginHandler: Send + Sync {
    /// Handle a plugin invocation
    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_config_default() {
        let config = PluginConfig::default();
        assert!(config.enabled);
        assert!(config.settings.is_empty());
    }

    #[test]
    fn test_metadata_roundtrip() {
        let meta = PluginMetadata {
            id: "code-analysis".to_string(),
            name: "Code Analysis".to_string(),
            version: Version::new(1, 0, 0),
            description: "Analyzes code quality".to_string(),
            author: "Steward".to_string(),
            capabilities: vec!["analyze".to_string()],
            required_permissions: vec!["read:files".to_string()],
        };

        let json = serde_json::to_string(&meta).unwrap();
        let back: PluginMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, meta.id);
        assert_eq!(back.version, Version::new(1, 0, 0));
    }
}
