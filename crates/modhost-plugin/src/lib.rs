//! # modhost-plugin
//!
//! Plugin framework for modhost. Provides:
//!
//! - Plugin registry with load, unload, enable and disable
//! - Module loading through a link-time factory table, or shared
//!   libraries via `libloading` (feature `dynamic`)
//! - Hook dispatcher broadcasting to every enabled plugin, aggregating the
//!   answers and reporting conflicting ones
//! - [`PluginHost`], the context object tying the three together

pub mod client;
pub mod error;
pub mod hooks;
pub mod host;
pub mod loader;
pub mod macros;
pub mod prelude;
pub mod registry;

pub use client::HookClient;
pub use error::PluginError;
pub use hooks::definitions::{
    DispatchResult, HookArg, HookArgs, HookConflict, HookResult, HookValue,
};
pub use hooks::dispatcher::HookDispatcher;
pub use host::PluginHost;
pub use loader::{ModuleLoader, StaticLoader};
pub use registry::{LoadedPlugin, Plugin, PluginInfo, PluginRegistry};
