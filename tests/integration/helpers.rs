//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use modhost_network::{HookEvents, Server, ServerOptions};
use modhost_plugin::prelude::*;
use modhost_plugin::{PluginHost, StaticLoader};

/// Hook activity observed by a [`Recorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    /// `OnNewClient` for the given client.
    Client(Uuid),
    /// `OnNewMessage` for the given client and payload.
    Message(Uuid, Vec<u8>),
}

/// How a [`Recorder`] reacts to its hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Behaviour {
    /// Close the client from inside `OnNewClient`.
    pub close_on_connect: bool,
    /// Sleep this long inside `OnNewMessage` when the payload is `b"slow"`.
    pub stall: Option<Duration>,
}

/// Plugin reporting every network hook into a channel.
#[derive(Debug)]
pub struct Recorder {
    seen: mpsc::UnboundedSender<Seen>,
    behaviour: Behaviour,
}

#[async_trait]
impl Plugin for Recorder {
    fn info(&self) -> PluginInfo {
        plugin_info!(
            name: "Recorder",
            title: "Recorder",
            version: "0.0.1",
            author: "tests"
        )
    }

    async fn call(&self, hook: &str, args: &HookArgs) -> Result<Option<HookValue>, PluginError> {
        let client = match args.client(0) {
            Some(client) => client,
            None => return Ok(None),
        };

        match hook {
            ON_NEW_CLIENT => {
                let _ = self.seen.send(Seen::Client(client.id()));
                if self.behaviour.close_on_connect {
                    client.close();
                }
            }
            ON_NEW_MESSAGE => {
                let data = args.bytes(1).map(|b| b.to_vec()).unwrap_or_default();
                if let Some(stall) = self.behaviour.stall {
                    if data == b"slow" {
                        tokio::time::sleep(stall).await;
                    }
                }
                let _ = self.seen.send(Seen::Message(client.id(), data));
            }
            _ => {}
        }
        Ok(None)
    }
}

/// Test application context
pub struct TestApp {
    /// Plugin host the server routes into
    pub host: Arc<PluginHost>,
    /// Running server on an ephemeral loopback port
    pub server: Server,
    /// Hook activity reported by the recorder plugin
    pub seen: Mutex<mpsc::UnboundedReceiver<Seen>>,
    /// Holds the module files
    _modules: tempfile::TempDir,
}

impl TestApp {
    /// Create a new test application with the recorder plugin loaded
    pub async fn new() -> Self {
        Self::with_behaviour(Behaviour::default()).await
    }

    /// Create a test application whose recorder behaves as given
    pub async fn with_behaviour(behaviour: Behaviour) -> Self {
        Self::build(behaviour, &["Recorder"]).await
    }

    /// Create a test application loading the named modules
    pub async fn build(behaviour: Behaviour, modules: &[&str]) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut loader = StaticLoader::new().with("Recorder", move || {
            Box::new(Recorder {
                seen: tx.clone(),
                behaviour,
            })
        });
        plugin_echo::register(&mut loader);

        let host = Arc::new(PluginHost::with_timeout(loader, Duration::from_secs(2)));

        let dir = tempfile::tempdir().expect("Failed to create module dir");
        for module in modules {
            let path: PathBuf = dir.path().join(format!("{module}.plugin"));
            std::fs::write(&path, b"").expect("Failed to write module");
            host.load(&path).await.expect("Failed to load module");
        }

        let server = Server::bind_with(
            ("127.0.0.1", 0),
            Arc::new(HookEvents::for_host(&host)),
            ServerOptions::default(),
        )
        .await
        .expect("Failed to bind server");

        Self {
            host,
            server,
            seen: Mutex::new(rx),
            _modules: dir,
        }
    }

    /// Connect a raw TCP client to the server
    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.server.local_addr())
            .await
            .expect("Failed to connect")
    }

    /// Wait for the next hook the recorder saw
    pub async fn next_seen(&self) -> Seen {
        let mut rx = self.seen.lock().await;
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("Timed out waiting for hook")
            .expect("Recorder channel closed")
    }

    /// Collect everything the recorder saw in the next `window`
    pub async fn drain_seen(&self, window: Duration) -> Vec<Seen> {
        let mut rx = self.seen.lock().await;
        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(item)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            seen.push(item);
        }
        seen
    }

    /// Poll until the server tracks `expected` clients
    pub async fn wait_for_clients(&self, expected: usize) {
        let result = tokio::time::timeout(Duration::from_secs(5), async {
            while self.server.client_count() != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(
            result.is_ok(),
            "Expected {expected} clients, have {}",
            self.server.client_count()
        );
    }
}

/// Write `data` and flush
pub async fn send(stream: &mut TcpStream, data: &[u8]) {
    stream.write_all(data).await.expect("Failed to write");
    stream.flush().await.expect("Failed to flush");
}

/// Read until `len` bytes arrive
pub async fn read_exact(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("Timed out reading")
        .expect("Failed to read");
    buf
}

/// Whether the peer has closed the stream
pub async fn reads_eof(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 16];
    matches!(
        tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf)).await,
        Ok(Ok(0)) | Ok(Err(_))
    )
}
