//! Prelude for convenient imports.

pub use async_trait::async_trait;

pub use crate::client::HookClient;
pub use crate::error::PluginError;
pub use crate::hooks::definitions::{
    HookArg, HookArgs, HookValue, ON_NEW_CLIENT, ON_NEW_MESSAGE, ON_SERVER_SHUTDOWN,
    ON_SERVER_START,
};
pub use crate::registry::{Plugin, PluginInfo};

pub use crate::{hook_args, plugin_info};
