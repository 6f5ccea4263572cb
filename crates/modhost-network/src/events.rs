//! Server events and their routing into plugin hooks.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use modhost_plugin::hooks::definitions::{ON_NEW_CLIENT, ON_NEW_MESSAGE};
use modhost_plugin::{HookArg, HookArgs, HookDispatcher, PluginHost};

use crate::client::Client;

/// Receiver of connection events raised by a [`Server`](crate::Server).
///
/// Events run on the raising client's task; a slow receiver delays only
/// that client's next read.
#[async_trait]
pub trait ServerEvents: Send + Sync + 'static {
    /// A connection was accepted.
    async fn on_new_client(&self, client: Arc<Client>);

    /// A non-empty chunk of bytes arrived from `client`.
    async fn on_new_message(&self, client: Arc<Client>, data: Bytes);
}

/// Routes server events into the hook dispatcher as `OnNewClient(client)`
/// and `OnNewMessage(client, bytes)`.
#[derive(Debug, Clone)]
pub struct HookEvents {
    dispatcher: Arc<HookDispatcher>,
}

impl HookEvents {
    /// Routes into the given dispatcher.
    pub fn new(dispatcher: Arc<HookDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Routes into the host's dispatcher.
    pub fn for_host(host: &PluginHost) -> Self {
        Self::new(host.dispatcher().clone())
    }
}

#[async_trait]
impl ServerEvents for HookEvents {
    async fn on_new_client(&self, client: Arc<Client>) {
        let args = HookArgs::new().with(HookArg::client(client));
        self.dispatcher.call_hook(ON_NEW_CLIENT, &args).await;
    }

    async fn on_new_message(&self, client: Arc<Client>, data: Bytes) {
        let args = HookArgs::new().with(HookArg::client(client)).with(data);
        self.dispatcher.call_hook(ON_NEW_MESSAGE, &args).await;
    }
}
