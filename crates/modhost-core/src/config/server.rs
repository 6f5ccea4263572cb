//! TCP server configuration.

use serde::{Deserialize, Serialize};

/// Listener and per-connection receive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port (0 picks an ephemeral port).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Size in bytes of each client's receive buffer.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Number of released receive buffers kept for reuse.
    #[serde(default = "default_buffer_pool_capacity")]
    pub buffer_pool_capacity: usize,
}

impl ServerConfig {
    /// Returns the `host:port` bind string.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_buffer_size: default_read_buffer_size(),
            buffer_pool_capacity: default_buffer_pool_capacity(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7777
}

fn default_read_buffer_size() -> usize {
    4096
}

fn default_buffer_pool_capacity() -> usize {
    16
}
