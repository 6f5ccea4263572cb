//! Plugin-layer error taxonomy.

use modhost_core::error::AppError;
use thiserror::Error;

/// Errors raised while loading or invoking plugins.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    /// The module could not be read, its symbol was missing, or construction failed.
    #[error("failed to load plugin from '{path}': {reason}")]
    Load {
        /// Module path.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// A plugin with the same name or file path is already loaded.
    #[error("plugin '{name}' is already loaded")]
    Duplicate {
        /// Offending name or path.
        name: String,
    },

    /// A single plugin's hook implementation faulted.
    #[error("plugin '{plugin}' failed in hook '{hook}': {reason}")]
    Invocation {
        /// Plugin name.
        plugin: String,
        /// Hook name.
        hook: String,
        /// Failure description.
        reason: String,
    },

    /// A typed call's aggregate could not be converted to the target type.
    #[error("hook '{hook}' result is not a {expected}: {reason}")]
    TypeMismatch {
        /// Hook name.
        hook: String,
        /// Target type name.
        expected: &'static str,
        /// Conversion error.
        reason: String,
    },
}

impl PluginError {
    /// Create a load error.
    pub fn load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invocation error.
    pub fn invocation(
        plugin: impl Into<String>,
        hook: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Invocation {
            plugin: plugin.into(),
            hook: hook.into(),
            reason: reason.into(),
        }
    }
}

impl From<PluginError> for AppError {
    fn from(err: PluginError) -> Self {
        let message = err.to_string();
        match err {
            PluginError::Duplicate { .. } => AppError::conflict(message),
            _ => AppError::with_source(modhost_core::error::ErrorKind::Plugin, message, err),
        }
    }
}
