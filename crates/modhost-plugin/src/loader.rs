//! Module loaders turning a path into a plugin instance.
//!
//! The constructor for a module is always chosen from the module's file
//! stem: `plugins/EchoPlugin.plugin` resolves the factory registered as
//! `EchoPlugin` in a [`StaticLoader`], and `plugins/EchoPlugin.so` resolves
//! the exported symbol `modhost_create_EchoPlugin` in a [`DynamicLoader`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::PluginError;
use crate::registry::Plugin;

/// Constructor producing a fresh plugin instance.
pub type PluginFactory = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Capability turning a module path into a plugin.
pub trait ModuleLoader: Send + Sync + fmt::Debug {
    /// Whether this loader understands the module at `path`.
    fn handles(&self, _path: &Path) -> bool {
        true
    }

    /// Reads the module, resolves its constructor and instantiates it.
    fn load(&self, path: &Path) -> Result<Arc<dyn Plugin>, PluginError>;
}

/// Returns the symbol name derived from a module's file stem.
pub fn module_symbol(path: &Path) -> Result<String, PluginError> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| PluginError::load(path.display().to_string(), "module has no file stem"))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Link-time plugin table keyed by symbol name.
///
/// Module files act as load triggers: the file must exist and be readable,
/// and its stem selects the factory.
#[derive(Clone, Default)]
pub struct StaticLoader {
    /// Symbol → constructor.
    factories: HashMap<String, PluginFactory>,
}

impl StaticLoader {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor under `symbol`, replacing any previous one.
    pub fn register<F>(&mut self, symbol: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.insert(symbol.into(), Arc::new(factory));
    }

    /// Builder form of [`StaticLoader::register`].
    pub fn with<F>(mut self, symbol: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.register(symbol, factory);
        self
    }

    /// Names of all registered symbols.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<_> = self.factories.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

impl fmt::Debug for StaticLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticLoader")
            .field("symbols", &self.symbols())
            .finish()
    }
}

impl ModuleLoader for StaticLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Plugin>, PluginError> {
        let path_str = path.display().to_string();

        std::fs::read(path)
            .map_err(|e| PluginError::load(path_str.clone(), format!("module unreadable: {e}")))?;

        let symbol = module_symbol(path)?;
        let factory = self.factories.get(&symbol).ok_or_else(|| {
            PluginError::load(path_str.clone(), format!("symbol '{symbol}' not found"))
        })?;

        let plugin = catch_unwind(AssertUnwindSafe(|| (**factory)())).map_err(|payload| {
            PluginError::load(
                path_str.clone(),
                format!("construction panicked: {}", panic_message(payload.as_ref())),
            )
        })?;

        debug!(path = %path_str, symbol = %symbol, "Static plugin instantiated");
        Ok(Arc::from(plugin))
    }
}

/// Tries each loader in order, using the first that handles the path.
#[derive(Debug, Default)]
pub struct CompositeLoader {
    loaders: Vec<Box<dyn ModuleLoader>>,
}

impl CompositeLoader {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a loader to the chain.
    pub fn with(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loaders.push(Box::new(loader));
        self
    }
}

impl ModuleLoader for CompositeLoader {
    fn handles(&self, path: &Path) -> bool {
        self.loaders.iter().any(|l| l.handles(path))
    }

    fn load(&self, path: &Path) -> Result<Arc<dyn Plugin>, PluginError> {
        self.loaders
            .iter()
            .find(|l| l.handles(path))
            .ok_or_else(|| {
                PluginError::load(path.display().to_string(), "no loader handles this module")
            })?
            .load(path)
    }
}

/// Dynamic plugin loader using `libloading` (feature-gated).
#[cfg(feature = "dynamic")]
pub mod dynamic_loader {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use tracing::info;

    use super::{ModuleLoader, module_symbol, panic_message};
    use crate::error::PluginError;
    use crate::registry::Plugin;

    /// Type of the constructor exported by dynamic plugins.
    ///
    /// Dynamic plugins must export:
    /// `extern "C" fn modhost_create_<Stem>() -> *mut dyn Plugin`
    pub type CreatePluginFn = unsafe extern "C" fn() -> *mut dyn Plugin;

    /// Prefix of the exported constructor symbol.
    pub const SYMBOL_PREFIX: &str = "modhost_create_";

    /// Loads plugins from shared libraries (.so / .dll / .dylib).
    ///
    /// Libraries stay mapped for the lifetime of the loader, so plugin code
    /// outlives every instance created from it.
    pub struct DynamicLoader {
        libraries: Mutex<Vec<libloading::Library>>,
    }

    impl DynamicLoader {
        /// Creates a new dynamic loader.
        pub fn new() -> Self {
            Self {
                libraries: Mutex::new(Vec::new()),
            }
        }

        /// Number of libraries currently mapped.
        pub fn library_count(&self) -> usize {
            self.libraries.lock().map(|l| l.len()).unwrap_or(0)
        }
    }

    impl Default for DynamicLoader {
        fn default() -> Self {
            Self::new()
        }
    }

    impl std::fmt::Debug for DynamicLoader {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("DynamicLoader")
                .field("loaded_count", &self.library_count())
                .finish()
        }
    }

    impl ModuleLoader for DynamicLoader {
        fn handles(&self, path: &Path) -> bool {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("so" | "dll" | "dylib")
            )
        }

        /// Loads arbitrary code from a shared library. Only load trusted plugins.
        fn load(&self, path: &Path) -> Result<Arc<dyn Plugin>, PluginError> {
            let path_str = path.display().to_string();
            let symbol = format!("{SYMBOL_PREFIX}{}", module_symbol(path)?);

            // SAFETY: the library is trusted by configuration; its initializers run here.
            let lib = unsafe { libloading::Library::new(path) }.map_err(|e| {
                PluginError::load(path_str.clone(), format!("library unreadable: {e}"))
            })?;

            let raw_plugin = {
                // SAFETY: the exported constructor must match `CreatePluginFn`.
                let create_fn: libloading::Symbol<CreatePluginFn> =
                    unsafe { lib.get(symbol.as_bytes()) }.map_err(|e| {
                        PluginError::load(
                            path_str.clone(),
                            format!("symbol '{symbol}' not found: {e}"),
                        )
                    })?;

                catch_unwind(AssertUnwindSafe(|| unsafe { create_fn() })).map_err(|payload| {
                    PluginError::load(
                        path_str.clone(),
                        format!("construction panicked: {}", panic_message(payload.as_ref())),
                    )
                })?
            };

            if raw_plugin.is_null() {
                return Err(PluginError::load(path_str, "constructor returned null"));
            }

            // SAFETY: the constructor hands over a `Box::into_raw` pointer.
            let plugin: Box<dyn Plugin> = unsafe { Box::from_raw(raw_plugin) };

            if let Ok(mut libraries) = self.libraries.lock() {
                libraries.push(lib);
            } else {
                std::mem::forget(lib);
            }

            info!(path = %path_str, symbol = %symbol, "Dynamic plugin loaded");
            Ok(Arc::from(plugin))
        }
    }
}

#[cfg(feature = "dynamic")]
pub use dynamic_loader::DynamicLoader;
