//! Registry of live peer connections
//!
//! Shared by every in-flight offer handler on the server. Insert and remove
//! are safe to call concurrently; [`ConnectionRegistry::close_all`] drains the
//! registry at shutdown by closing every handle concurrently.

use crate::peer::{ConnectionId, PeerConnectionHandle};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;

/// Set of live peer connection handles, keyed by connection id
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<ConnectionId, Arc<PeerConnectionHandle>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle; returns false if it was already present
    pub fn insert(&self, handle: Arc<PeerConnectionHandle>) -> bool {
        let id = handle.id();
        let inserted = self.connections.insert(id, handle).is_none();
        tracing::debug!(connection_id = %id, live = self.len(), "Registered connection");
        inserted
    }

    /// Deregister a handle
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<PeerConnectionHandle>> {
        let removed = self.connections.remove(id).map(|(_, handle)| handle);
        if removed.is_some() {
            tracing::debug!(connection_id = %id, live = self.len(), "Deregistered connection");
        }
        removed
    }

    /// Whether a handle is registered
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are registered
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Every registered connection
    pub fn handles(&self) -> Vec<Arc<PeerConnectionHandle>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Ids of every registered connection
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    /// Close every registered connection concurrently, then clear the registry
    ///
    /// Returns the number of connections that were closed.
    pub async fn close_all(&self) -> usize {
        let handles = self.handles();

        let count = handles.len();
        if count > 0 {
            tracing::info!("Closing {} peer connections", count);
        }

        let results = join_all(handles.iter().map(|handle| handle.close())).await;
        for (handle, result) in handles.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(connection_id = %handle.id(), "Error closing connection: {}", e);
            }
        }

        self.connections.clear();
        count
    }
}
