//! Plugin host — the context object owning loader, registry and dispatcher.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{error, info, warn};

use modhost_core::config::PluginConfig;

use crate::error::PluginError;
use crate::hooks::definitions::{DispatchResult, HookArgs, HookValue};
use crate::hooks::dispatcher::{DEFAULT_HOOK_TIMEOUT, HookDispatcher};
use crate::loader::ModuleLoader;
use crate::registry::{LoadedPlugin, PluginRegistry, PluginStatus};

/// Manages plugin lifecycle and routes hook calls.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct PluginHost {
    /// Module loader.
    loader: Arc<dyn ModuleLoader>,
    /// Plugin registry.
    registry: Arc<PluginRegistry>,
    /// Hook dispatcher.
    dispatcher: Arc<HookDispatcher>,
    /// Failed load attempts.
    load_failures: AtomicU64,
}

impl PluginHost {
    /// Creates a host with the default invocation timeout.
    pub fn new(loader: impl ModuleLoader + 'static) -> Self {
        Self::with_timeout(loader, DEFAULT_HOOK_TIMEOUT)
    }

    /// Creates a host from the plugin configuration section.
    pub fn from_config(loader: impl ModuleLoader + 'static, config: &PluginConfig) -> Self {
        Self::with_timeout(loader, Duration::from_millis(config.hook_timeout_ms))
    }

    /// Creates a host bounding each plugin invocation by `hook_timeout`.
    pub fn with_timeout(loader: impl ModuleLoader + 'static, hook_timeout: Duration) -> Self {
        let registry = Arc::new(PluginRegistry::new());
        let dispatcher = Arc::new(HookDispatcher::new(registry.clone(), hook_timeout));

        Self {
            loader: Arc::new(loader),
            registry,
            dispatcher,
            load_failures: AtomicU64::new(0),
        }
    }

    /// Loads the module at `path`.
    ///
    /// Failures are logged here and leave the registry unchanged.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<Arc<LoadedPlugin>, PluginError> {
        let path = path.as_ref();
        match self.registry.load(self.loader.as_ref(), path).await {
            Ok(plugin) => Ok(plugin),
            Err(e) => {
                self.load_failures.fetch_add(1, Ordering::Relaxed);
                error!(path = %path.display(), error = %e, "Plugin load failed");
                Err(e)
            }
        }
    }

    /// Loads every module in `dir` the loader understands, in file name order.
    ///
    /// Returns the number of plugins loaded.
    pub async fn load_directory(&self, dir: impl AsRef<Path>) -> usize {
        let dir = dir.as_ref();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Plugin directory unreadable");
                return 0;
            }
        };

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && self.loader.handles(p))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in &paths {
            if self.load(path).await.is_ok() {
                loaded += 1;
            }
        }

        info!(dir = %dir.display(), loaded, found = paths.len(), "Plugin directory scanned");
        loaded
    }

    /// Unloads the plugin loaded from `path`. Returns `false` if none matched.
    pub async fn unload(&self, path: impl AsRef<Path>) -> bool {
        self.registry.unload(path.as_ref()).await.is_some()
    }

    /// Unloads all plugins.
    pub async fn unload_all(&self) {
        let count = self.registry.unload_all().await;
        info!(count, "All plugins unloaded");
    }

    /// Enables a plugin by name.
    pub async fn enable(&self, name: &str) -> bool {
        self.registry.enable(name).await
    }

    /// Disables a plugin by name; it stays resident.
    pub async fn disable(&self, name: &str) -> bool {
        self.registry.disable(name).await
    }

    /// Dispatches a hook and returns the full outcome.
    pub async fn dispatch(&self, name: &str, args: &HookArgs) -> DispatchResult {
        self.dispatcher.dispatch(name, args).await
    }

    /// Dispatches a hook and returns the aggregated answer.
    pub async fn call(&self, name: &str, args: &HookArgs) -> Option<HookValue> {
        self.dispatcher.call(name, args).await
    }

    /// Typed form of [`PluginHost::call`].
    pub async fn call_as<T: DeserializeOwned + Default>(&self, name: &str, args: &HookArgs) -> T {
        self.dispatcher.call_as(name, args).await
    }

    /// Fires a hook without a result.
    pub async fn call_hook(&self, name: &str, args: &HookArgs) {
        self.dispatcher.call_hook(name, args).await
    }

    /// Returns the hook dispatcher.
    pub fn dispatcher(&self) -> &Arc<HookDispatcher> {
        &self.dispatcher
    }

    /// Returns the plugin registry.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Lists all loaded plugins.
    pub async fn list_plugins(&self) -> Vec<PluginStatus> {
        self.registry.list().await
    }

    /// Number of failed load attempts since construction.
    pub fn load_failures(&self) -> u64 {
        self.load_failures.load(Ordering::Relaxed)
    }
}
