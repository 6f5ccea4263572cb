//! Plugin registry — stores loaded plugin instances and metadata.
//!
//! The plugin list is kept behind an `Arc` and replaced wholesale on every
//! load or unload, so a dispatch holding a [`PluginRegistry::snapshot`]
//! never observes a partially updated list.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::PluginError;
use crate::hooks::definitions::{HookArgs, HookValue};
use crate::loader::ModuleLoader;

/// Metadata about a plugin, reported by the plugin itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Unique plugin identifier.
    pub name: String,
    /// Human-readable title.
    pub title: String,
    /// Author or maintainer.
    pub author: String,
    /// Plugin version string.
    pub version: String,
    /// Plugin description.
    #[serde(default)]
    pub description: String,
}

/// Trait that all plugins must implement.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync + std::fmt::Debug {
    /// Returns plugin metadata.
    fn info(&self) -> PluginInfo;

    /// Handles a hook invocation.
    ///
    /// Returns `Ok(None)` for hooks the plugin does not implement.
    async fn call(&self, hook: &str, args: &HookArgs) -> Result<Option<HookValue>, PluginError>;

    /// Called once after construction, before the plugin joins the registry.
    async fn on_load(&self) -> Result<(), String> {
        Ok(())
    }

    /// Called once after the plugin has left the registry.
    async fn on_unload(&self) -> Result<(), String> {
        Ok(())
    }
}

/// A plugin instance resident in the registry.
#[derive(Debug)]
pub struct LoadedPlugin {
    /// Metadata captured at load time; never changes afterwards.
    info: PluginInfo,
    /// Module the plugin was loaded from.
    file_path: PathBuf,
    /// Whether dispatches invoke this plugin.
    enabled: AtomicBool,
    /// The plugin implementation.
    instance: Arc<dyn Plugin>,
    /// When the plugin was loaded.
    loaded_at: DateTime<Utc>,
}

impl LoadedPlugin {
    /// Wraps a freshly constructed plugin, enabled.
    pub fn new(instance: Arc<dyn Plugin>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            info: instance.info(),
            file_path: file_path.into(),
            enabled: AtomicBool::new(true),
            instance,
            loaded_at: Utc::now(),
        }
    }

    /// Plugin name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Plugin metadata.
    pub fn info(&self) -> &PluginInfo {
        &self.info
    }

    /// Module path.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Whether the plugin takes part in dispatches.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// The plugin implementation.
    pub fn instance(&self) -> &Arc<dyn Plugin> {
        &self.instance
    }

    /// Snapshot of the plugin's externally visible state.
    pub fn status(&self) -> PluginStatus {
        PluginStatus {
            info: self.info.clone(),
            file_path: self.file_path.display().to_string(),
            enabled: self.is_enabled(),
            loaded_at: self.loaded_at,
        }
    }
}

/// Serializable view of a loaded plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginStatus {
    /// Metadata.
    pub info: PluginInfo,
    /// Module path.
    pub file_path: String,
    /// Enabled flag.
    pub enabled: bool,
    /// Load time.
    pub loaded_at: DateTime<Utc>,
}

/// Ordered registry of all loaded plugins.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    /// Plugins in load order.
    plugins: RwLock<Arc<Vec<Arc<LoadedPlugin>>>>,
}

impl PluginRegistry {
    /// Creates a new empty plugin registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the module at `path` through `loader` and appends it.
    ///
    /// Nothing is added if the module cannot be loaded, its `on_load` fails,
    /// or a plugin with the same name or path is already resident.
    pub async fn load(
        &self,
        loader: &dyn ModuleLoader,
        path: &Path,
    ) -> Result<Arc<LoadedPlugin>, PluginError> {
        let path_str = path.display().to_string();

        if self.find_by_path(path).await.is_some() {
            return Err(PluginError::Duplicate { name: path_str });
        }

        let instance = loader.load(path)?;
        let name = instance.info().name;
        if self.get(&name).await.is_some() {
            return Err(PluginError::Duplicate { name });
        }

        instance
            .on_load()
            .await
            .map_err(|e| PluginError::load(path_str.clone(), format!("on_load failed: {e}")))?;

        let plugin = Arc::new(LoadedPlugin::new(instance, path));
        if let Err(e) = self.insert(plugin.clone()).await {
            // a concurrent load won the slot after on_load ran
            if let Err(unload_err) = plugin.instance().on_unload().await {
                warn!(plugin = %name, error = %unload_err, "Plugin unload returned error");
            }
            return Err(e);
        }

        let info = plugin.info();
        info!(
            plugin = %info.name,
            path = %path_str,
            "Loaded plugin {} by {} v{}",
            info.title,
            info.author,
            info.version
        );

        Ok(plugin)
    }

    /// Appends an already constructed plugin.
    pub async fn insert(&self, plugin: Arc<LoadedPlugin>) -> Result<(), PluginError> {
        let mut guard = self.plugins.write().await;

        if let Some(existing) = guard
            .iter()
            .find(|p| p.name() == plugin.name() || p.file_path() == plugin.file_path())
        {
            let name = if existing.name() == plugin.name() {
                plugin.name().to_string()
            } else {
                plugin.file_path().display().to_string()
            };
            return Err(PluginError::Duplicate { name });
        }

        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(plugin);
        *guard = Arc::new(next);

        Ok(())
    }

    /// Disables and removes the plugin loaded from `path`.
    ///
    /// No-op when no plugin matches.
    pub async fn unload(&self, path: &Path) -> Option<Arc<LoadedPlugin>> {
        let removed = {
            let mut guard = self.plugins.write().await;
            let index = guard.iter().position(|p| p.file_path() == path)?;

            let plugin = guard[index].clone();
            plugin.set_enabled(false);

            let next: Vec<_> = guard
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, p)| p.clone())
                .collect();
            *guard = Arc::new(next);
            plugin
        };

        if let Err(e) = removed.instance().on_unload().await {
            warn!(plugin = %removed.name(), error = %e, "Plugin unload returned error");
        }

        let info = removed.info();
        info!(
            plugin = %info.name,
            path = %path.display(),
            "Unloaded plugin {} by {} v{}",
            info.title,
            info.author,
            info.version
        );

        Some(removed)
    }

    /// Unloads every plugin, last loaded first.
    pub async fn unload_all(&self) -> usize {
        let snapshot = self.snapshot().await;
        let mut count = 0;
        for plugin in snapshot.iter().rev() {
            if self.unload(plugin.file_path()).await.is_some() {
                count += 1;
            }
        }
        count
    }

    /// Enables a plugin by name. Returns `false` if no plugin matches.
    pub async fn enable(&self, name: &str) -> bool {
        self.toggle(name, true).await
    }

    /// Disables a plugin by name without unloading it.
    pub async fn disable(&self, name: &str) -> bool {
        self.toggle(name, false).await
    }

    async fn toggle(&self, name: &str, enabled: bool) -> bool {
        let Some(plugin) = self.get(name).await else {
            return false;
        };

        plugin.set_enabled(enabled);
        info!(
            plugin = %name,
            enabled = enabled,
            "{} plugin {} by {} v{}",
            if enabled { "Enabled" } else { "Disabled" },
            plugin.info().title,
            plugin.info().author,
            plugin.info().version
        );
        true
    }

    /// Returns the current plugin list. Later registry mutations never
    /// affect a snapshot already taken.
    pub async fn snapshot(&self) -> Arc<Vec<Arc<LoadedPlugin>>> {
        self.plugins.read().await.clone()
    }

    /// Gets a plugin by name.
    pub async fn get(&self, name: &str) -> Option<Arc<LoadedPlugin>> {
        let plugins = self.plugins.read().await;
        plugins.iter().find(|p| p.name() == name).cloned()
    }

    /// Gets a plugin by module path.
    pub async fn find_by_path(&self, path: &Path) -> Option<Arc<LoadedPlugin>> {
        let plugins = self.plugins.read().await;
        plugins.iter().find(|p| p.file_path() == path).cloned()
    }

    /// Lists every plugin in load order.
    pub async fn list(&self) -> Vec<PluginStatus> {
        let plugins = self.plugins.read().await;
        plugins.iter().map(|p| p.status()).collect()
    }

    /// Returns plugin count.
    pub async fn count(&self) -> usize {
        self.plugins.read().await.len()
    }

    /// Checks whether a plugin is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.get(name).await.is_some()
    }

    /// Checks whether a plugin is enabled.
    pub async fn is_enabled(&self, name: &str) -> bool {
        self.get(name)
            .await
            .map(|p| p.is_enabled())
            .unwrap_or(false)
    }
}
