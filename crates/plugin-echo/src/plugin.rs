//! Echo plugin implementation and its static registration.

use modhost_plugin::StaticLoader;
use modhost_plugin::prelude::*;

use crate::hooks;

/// Symbol the plugin is registered under; modules named `EchoPlugin.*` load it.
pub const SYMBOL: &str = "EchoPlugin";

/// Replies to `Ping` and echoes client messages.
#[derive(Debug, Default)]
pub struct EchoPlugin;

impl EchoPlugin {
    /// Create a new echo plugin
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for EchoPlugin {
    fn info(&self) -> PluginInfo {
        plugin_info!(
            name: SYMBOL,
            title: "Echo",
            version: env!("CARGO_PKG_VERSION"),
            author: "modhost",
            description: "Answers Ping and echoes every message back to its client"
        )
    }

    async fn call(&self, hook: &str, args: &HookArgs) -> Result<Option<HookValue>, PluginError> {
        match hook {
            hooks::PING => Ok(Some(hooks::ping())),
            ON_NEW_MESSAGE => hooks::echo(SYMBOL, args).await,
            _ => Ok(None),
        }
    }

    async fn on_load(&self) -> Result<(), String> {
        tracing::info!("Echo plugin ready");
        Ok(())
    }
}

/// Adds the echo plugin to a static factory table.
pub fn register(loader: &mut StaticLoader) {
    loader.register(SYMBOL, || Box::new(EchoPlugin::new()));
}
