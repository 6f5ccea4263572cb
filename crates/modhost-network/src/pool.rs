//! Client pool — tracks every live connection of a server.

use std::sync::Arc;

use dashmap::DashMap;

use crate::client::{Client, ClientId};

/// Thread-safe set of accepted clients.
///
/// Insertions come from the accept task, removals from each receive task
/// and from server shutdown. `remove` hands the entry to exactly one caller.
#[derive(Debug, Default)]
pub struct ClientPool {
    /// Client ID → client handle.
    by_id: DashMap<ClientId, Arc<Client>>,
}

impl ClientPool {
    /// Creates a new empty client pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client to the pool.
    pub fn add(&self, client: Arc<Client>) {
        self.by_id.insert(client.id, client);
    }

    /// Removes a client from the pool, returning it if it was still present.
    pub fn remove(&self, id: &ClientId) -> Option<Arc<Client>> {
        self.by_id.remove(id).map(|(_, client)| client)
    }

    /// Gets a specific client by ID.
    pub fn get(&self, id: &ClientId) -> Option<Arc<Client>> {
        self.by_id.get(id).map(|entry| entry.value().clone())
    }

    /// Whether a client is tracked.
    pub fn contains(&self, id: &ClientId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Returns total number of tracked clients.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether no clients are tracked.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Returns all client handles.
    pub fn all(&self) -> Vec<Arc<Client>> {
        self.by_id.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Closes every client, then removes it. Returns the clients removed here.
    ///
    /// Each client is marked disconnected before it leaves the pool, so a
    /// receive task never dispatches for a client that is no longer tracked.
    /// Clients that self-remove concurrently are returned by whichever side
    /// removes them first, never by both.
    pub fn close_all(&self) -> Vec<Arc<Client>> {
        self.ids()
            .iter()
            .filter_map(|id| {
                self.get(id)?.close();
                self.remove(id)
            })
            .collect()
    }

    fn ids(&self) -> Vec<ClientId> {
        self.by_id.iter().map(|entry| *entry.key()).collect()
    }
}
