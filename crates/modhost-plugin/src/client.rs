//! Client handle exposed to plugins through hook arguments.

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;
use uuid::Uuid;

/// A connected network client as seen from inside a hook.
///
/// The network layer implements this for its connection type so plugins
/// can reply to or drop a client without depending on the server crate.
#[async_trait]
pub trait HookClient: Send + Sync + fmt::Debug {
    /// Unique connection identifier.
    fn id(&self) -> Uuid;

    /// Remote address of the connection.
    fn peer_addr(&self) -> SocketAddr;

    /// Whether the connection is still open.
    fn is_connected(&self) -> bool;

    /// Writes raw bytes to the client.
    async fn send(&self, data: &[u8]) -> std::io::Result<()>;

    /// Closes the connection, stopping its receive loop.
    fn close(&self);
}
