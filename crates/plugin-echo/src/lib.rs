//! Echo plugin for modhost.
//!
//! Answers the `Ping` hook with `"pong"` and writes every `OnNewMessage`
//! payload back to the client it came from.

pub mod hooks;
pub mod plugin;

pub use plugin::{EchoPlugin, SYMBOL, register};
