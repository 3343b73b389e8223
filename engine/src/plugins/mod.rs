//! Plugin Registry
//!
//! In-memory registry of named capabilities. Plugins are registered at
//! startup and mutable only through enable/disable and settings-merge
//! operations; handlers are invoked through `execute_plugin` and their
//! errors propagate unmodified.

pub mod builtin;

use sdk::errors::EngineError;
use sdk::plugin::{PluginConfig, PluginHandler, PluginMetadata};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

struct PluginEntry {
    metadata: PluginMetadata,
    config: PluginConfig,
    handler: Arc<dyn PluginHandler>,
}

/// Registry of plugins keyed by id
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Mutex<HashMap<String, PluginEntry>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the built-in plugins: code-analysis, component-generator,
    /// performance-analyzer.
    pub fn load_plugins(&self) -> Result<(), EngineError> {
        for (metadata, config, handler) in builtin::built_in_plugins()? {
            self.register_plugin(metadata, config, handler);
        }

        info!(count = self.list_plugins().len(), "plugins loaded");
        Ok(())
    }

    /// Register (or replace) a plugin under its metadata id.
    pub fn register_plugin(
        &self,
        metadata: PluginMetadata,
        config: PluginConfig,
        handler: Arc<dyn PluginHandler>,
    ) {
        let id = metadata.id.clone();
        self.lock().insert(
            id,
            PluginEntry {
                metadata,
                config,
                handler,
            },
        );
    }

    /// Metadata of every registered plugin.
    pub fn list_plugins(&self) -> Vec<PluginMetadata> {
        self.lock().values().map(|p| p.metadata.clone()).collect()
    }

    /// Snapshot of a plugin's config.
    pub fn get_config(&self, id: &str) -> Option<PluginConfig> {
        self.lock().get(id).map(|p| p.config.clone())
    }

    /// Mark a plugin usable again.
    pub fn enable_plugin(&self, id: &str) {
        if let Some(entry) = self.lock().get_mut(id) {
            entry.config.enabled = true;
        }
    }

    /// Take a plugin out of rotation without unregistering it.
    pub fn disable_plugin(&self, id: &str) {
        if let Some(entry) = self.lock().get_mut(id) {
            entry.config.enabled = false;
        }
    }

    /// Shallow-merge settings into a plugin's config.
    pub fn update_plugin_config(
        &self,
        id: &str,
        settings: serde_json::Map<String, serde_json::Value>,
    ) {
        if let Some(entry) = self.lock().get_mut(id) {
            for (key, value) in settings {
                entry.config.settings.insert(key, value);
            }
        }
    }

    /// Resolve and invoke a plugin handler.
    ///
    /// Fails with `PluginNotFound` for unregistered ids and
    /// `PluginDisabled` for registered-but-disabled ones; whatever the
    /// handler itself returns or raises passes through untouched.
    pub async fn execute_plugin(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        let handler = self.resolve(name)?;
        handler.execute(args).await
    }

    fn resolve(&self, id: &str) -> Result<Arc<dyn PluginHandler>, EngineError> {
        let plugins = self.lock();
        let entry = plugins
            .get(id)
            .ok_or_else(|| EngineError::PluginNotFound(id.to_string()))?;

        if !entry.config.enabled {
            return Err(EngineError::PluginDisabled(id.to_string()));
        }

        Ok(Arc::clone(&entry.handler))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PluginEntry>> {
        match self.plugins.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
