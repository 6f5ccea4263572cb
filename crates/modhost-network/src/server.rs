//! TCP server — accept task plus one receive task per client.
//!
//! States: `Listening` from a successful bind until `close()`, then
//! `Stopped`. Shutdown is cooperative: every blocking accept or read is
//! raced against a cancellation token, so closing never waits on a poll
//! interval.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use modhost_core::config::ServerConfig;
use modhost_core::error::{AppError, ErrorKind};
use modhost_core::pool::ObjectPool;
use modhost_core::result::AppResult;

use crate::client::{Client, ClientId};
use crate::events::ServerEvents;
use crate::pool::ClientPool;

/// Per-server tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// Bytes read per receive call.
    pub read_buffer_size: usize,
    /// Idle receive buffers kept for reuse.
    pub buffer_pool_capacity: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            read_buffer_size: 4096,
            buffer_pool_capacity: 16,
        }
    }
}

impl From<&ServerConfig> for ServerOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            read_buffer_size: config.read_buffer_size.max(1),
            buffer_pool_capacity: config.buffer_pool_capacity,
        }
    }
}

/// State shared between the server handle and its tasks.
struct Shared {
    /// Live clients.
    clients: Arc<ClientPool>,
    /// Event receiver.
    events: Arc<dyn ServerEvents>,
    /// Reusable receive buffers.
    buffers: ObjectPool<Vec<u8>>,
    /// Cancelled on close; parent of every client token.
    cancel: CancellationToken,
    /// Tracks the accept task and every client task.
    tracker: TaskTracker,
}

/// A listening TCP server whose connection events feed a [`ServerEvents`].
pub struct Server {
    /// Bound address.
    local_addr: SocketAddr,
    /// Shared task state.
    shared: Arc<Shared>,
    /// `true` until `close()`.
    listening: AtomicBool,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("clients", &self.shared.clients.len())
            .field("listening", &self.is_listening())
            .finish()
    }
}

impl Server {
    /// Binds `host:port` and starts accepting immediately.
    pub async fn bind(
        host: &str,
        port: u16,
        events: Arc<dyn ServerEvents>,
    ) -> AppResult<Self> {
        Self::bind_with((host, port), events, ServerOptions::default()).await
    }

    /// Binds using the `[server]` configuration section.
    pub async fn from_config(
        config: &ServerConfig,
        events: Arc<dyn ServerEvents>,
    ) -> AppResult<Self> {
        Self::bind_with(
            (config.host.as_str(), config.port),
            events,
            ServerOptions::from(config),
        )
        .await
    }

    /// Binds `addr` with explicit options and starts accepting immediately.
    pub async fn bind_with(
        addr: impl ToSocketAddrs,
        events: Arc<dyn ServerEvents>,
        options: ServerOptions,
    ) -> AppResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Connection, format!("Failed to bind server: {e}"), e)
            })?;
        let local_addr = listener.local_addr()?;

        let buffer_size = options.read_buffer_size.max(1);
        let shared = Arc::new(Shared {
            clients: Arc::new(ClientPool::new()),
            events,
            buffers: ObjectPool::with_factory(options.buffer_pool_capacity, move || {
                vec![0u8; buffer_size]
            }),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        });

        shared
            .tracker
            .spawn(accept_loop(listener, Arc::clone(&shared)));

        info!(addr = %local_addr, "Server listening");

        Ok(Self {
            local_addr,
            shared,
            listening: AtomicBool::new(true),
        })
    }

    /// Bound address (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the server is still accepting connections.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Number of tracked clients.
    pub fn client_count(&self) -> usize {
        self.shared.clients.len()
    }

    /// All tracked clients.
    pub fn clients(&self) -> Vec<Arc<Client>> {
        self.shared.clients.all()
    }

    /// Gets a tracked client by ID.
    pub fn client(&self, id: &ClientId) -> Option<Arc<Client>> {
        self.shared.clients.get(id)
    }

    /// The tracked client set.
    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.shared.clients
    }

    /// Stops the server: closes every client, stops the listener and waits
    /// for all receive tasks to finish.
    ///
    /// Idempotent; later calls only wait for the first one to complete.
    pub async fn close(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            self.shared.cancel.cancel();
            let closed = self.shared.clients.close_all();
            info!(
                addr = %self.local_addr,
                clients = closed.len(),
                "Closing server"
            );

            self.shared.tracker.close();
        }

        self.shared.tracker.wait().await;
        debug!(addr = %self.local_addr, "Server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            result = listener.accept() => result,
        };

        match accepted {
            Ok((stream, peer_addr)) => admit(&shared, stream, peer_addr),
            Err(e) => {
                if shared.cancel.is_cancelled() {
                    break;
                }
                error!(error = %e, "Accept failed");
            }
        }
    }

    debug!("Accept loop stopped");
}

fn admit(shared: &Arc<Shared>, stream: TcpStream, peer_addr: SocketAddr) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %peer_addr, error = %e, "Failed to set TCP_NODELAY");
    }

    let (client, reader) = match Client::new(stream, &shared.cancel) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(peer = %peer_addr, error = %e, "Dropping connection that closed during accept");
            return;
        }
    };

    shared.clients.add(Arc::clone(&client));
    info!(client_id = %client.id, peer = %peer_addr, "Client connected");

    shared
        .tracker
        .spawn(receive_loop(client, reader, Arc::clone(shared)));
}

async fn receive_loop(client: Arc<Client>, mut reader: OwnedReadHalf, shared: Arc<Shared>) {
    if client.is_connected() && !client.cancellation().is_cancelled() {
        shared.events.on_new_client(Arc::clone(&client)).await;
    }

    let mut buf = shared.buffers.acquire();

    loop {
        let read = tokio::select! {
            biased;
            _ = client.cancellation().cancelled() => break,
            result = reader.read(&mut buf) => result,
        };

        match read {
            Ok(0) => {
                debug!(client_id = %client.id, "Connection closed by peer");
                break;
            }
            Ok(n) => {
                if !client.is_connected() || client.cancellation().is_cancelled() {
                    break;
                }
                client.record_received(n);
                let data = Bytes::copy_from_slice(&buf[..n]);
                shared.events.on_new_message(Arc::clone(&client), data).await;
            }
            Err(e) => {
                warn!(client_id = %client.id, error = %e, "Receive failed");
                break;
            }
        }
    }

    client.mark_disconnected();
    shared.clients.remove(&client.id);
    client.shutdown_writer().await;
    shared.buffers.release(buf);

    info!(client_id = %client.id, peer = %client.peer_addr(), "Client disconnected");
}
