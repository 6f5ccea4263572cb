//! Individual TCP client connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use modhost_plugin::HookClient;

/// Unique client identifier
pub type ClientId = Uuid;

/// A handle to one accepted connection.
///
/// The read half is owned by the client's receive task; this handle keeps
/// the write half so plugins can reply.
#[derive(Debug)]
pub struct Client {
    /// Unique client ID
    pub id: ClientId,
    /// Remote address
    peer_addr: SocketAddr,
    /// Cleared exactly once, when the connection is closed or lost
    connected: AtomicBool,
    /// Stops the receive task; a child of the server's token
    cancel: CancellationToken,
    /// Outbound half of the socket
    writer: Mutex<OwnedWriteHalf>,
    /// When the connection was accepted
    connected_at: DateTime<Utc>,
    /// Total bytes delivered to hooks
    bytes_received: AtomicU64,
}

impl Client {
    /// Wraps an accepted stream, returning the handle and the read half
    /// for the receive task.
    pub fn new(
        stream: TcpStream,
        parent: &CancellationToken,
    ) -> std::io::Result<(Arc<Self>, OwnedReadHalf)> {
        let peer_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();

        let client = Arc::new(Self {
            id: Uuid::new_v4(),
            peer_addr,
            connected: AtomicBool::new(true),
            cancel: parent.child_token(),
            writer: Mutex::new(writer),
            connected_at: Utc::now(),
            bytes_received: AtomicU64::new(0),
        });

        Ok((client, reader))
    }

    /// Remote address of the connection
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Whether the connection is still open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Marks the client disconnected. Returns `true` for the first caller only.
    pub fn mark_disconnected(&self) -> bool {
        self.connected.swap(false, Ordering::SeqCst)
    }

    /// Closes the connection: no further events are raised and the receive
    /// task stops at its next await point.
    pub fn close(&self) {
        self.mark_disconnected();
        self.cancel.cancel();
    }

    /// Token cancelled when the client is closed or the server stops
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Writes raw bytes to the peer.
    pub async fn send(&self, data: &[u8]) -> std::io::Result<()> {
        if !self.is_connected() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                format!("client {} is disconnected", self.id),
            ));
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await?;
        writer.flush().await
    }

    /// Shuts down the outbound half so the peer observes end-of-stream.
    pub(crate) async fn shutdown_writer(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(client_id = %self.id, error = %e, "Socket shutdown failed");
        }
    }

    pub(crate) fn record_received(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of client info
    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id,
            peer_addr: self.peer_addr.to_string(),
            connected_at: self.connected_at,
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            connected: self.is_connected(),
        }
    }
}

#[async_trait]
impl HookClient for Client {
    fn id(&self) -> Uuid {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    fn is_connected(&self) -> bool {
        Client::is_connected(self)
    }

    async fn send(&self, data: &[u8]) -> std::io::Result<()> {
        Client::send(self, data).await
    }

    fn close(&self) {
        Client::close(self)
    }
}

/// Snapshot of client info (serializable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client ID
    pub id: ClientId,
    /// Remote address
    pub peer_addr: String,
    /// Accept time
    pub connected_at: DateTime<Utc>,
    /// Bytes received so far
    pub bytes_received: u64,
    /// Is connected
    pub connected: bool,
}
