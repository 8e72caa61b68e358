//! Live connection registry
//!
//! Owned by the `ChatServer` actor, so it needs no locking of its own.

use std::collections::HashMap;

use crate::client::Client;
use crate::types::{ClientId, Identity};

/// All authenticated connections: ClientId -> Client
///
/// Several connections may share one identity; nothing here forbids it.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    clients: HashMap<ClientId, Client>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection
    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id, client);
    }

    /// Unregister a connection
    ///
    /// Unknown ids are ignored, so a double disconnect is harmless.
    pub fn remove(&mut self, client_id: &ClientId) -> Option<Client> {
        self.clients.remove(client_id)
    }

    pub fn get(&self, client_id: &ClientId) -> Option<&Client> {
        self.clients.get(client_id)
    }

    /// Snapshot of every registered connection
    pub fn all(&self) -> Vec<Client> {
        self.clients.values().cloned().collect()
    }

    /// Number of live connections bound to `identity`
    pub fn connection_count(&self, identity: &Identity) -> usize {
        self.clients
            .values()
            .filter(|c| &c.identity == identity)
            .count()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Drop every connection, closing their outbound channels
    pub fn clear(&mut self) {
        self.clients.clear();
    }
}
