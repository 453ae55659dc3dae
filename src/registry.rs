//! Registry of live connections.
//!
//! [`ConnectionRegistry`] maps a [`ConnectionId`] to its [`Connection`]. The
//! server consults [`ConnectionRegistry::len`] for admission control and uses
//! [`ConnectionRegistry::clear_all`] to tear every connection down at
//! shutdown. A connection inserts itself before its reader task starts and
//! removes itself when it stops.
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::connection::Connection;

/// Identifier assigned to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u32);

impl From<u32> for ConnectionId {
    fn from(value: u32) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub const fn new(id: u32) -> Self { Self(id) }

    /// Return the inner `u32` representation.
    #[must_use]
    pub const fn as_u32(&self) -> u32 { self.0 }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

/// Errors returned by registry lookups.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No connection is registered under the id.
    #[error("connection not found: {0}")]
    NotFound(ConnectionId),
}

/// Concurrent map of live connections keyed by [`ConnectionId`].
#[derive(Default)]
pub struct ConnectionRegistry(DashMap<ConnectionId, Arc<Connection>>);

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Insert a connection.
    pub fn add(&self, conn: Arc<Connection>) {
        let id = conn.id();
        self.0.insert(id, conn);
        log::debug!("connection added: conn_id={id}, active={}", self.0.len());
    }

    /// Remove a connection, returning it if it was present.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let removed = self.0.remove(&id).map(|(_, conn)| conn);
        if removed.is_some() {
            log::debug!("connection removed: conn_id={id}, active={}", self.0.len());
        }
        removed
    }

    /// Look up a connection.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if no connection has the id.
    pub fn get(&self, id: ConnectionId) -> Result<Arc<Connection>, RegistryError> {
        self.0
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(RegistryError::NotFound(id))
    }

    /// Return `true` if a connection is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool { self.0.contains_key(&id) }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Return `true` when no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Ids of the registered connections, in no particular order.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> { self.0.iter().map(|entry| *entry.key()).collect() }

    /// Stop every registered connection and empty the registry.
    ///
    /// The handles are collected first so no shard lock is held while a
    /// connection runs its stop hook.
    pub async fn clear_all(&self) {
        let conns: Vec<Arc<Connection>> =
            self.0.iter().map(|entry| Arc::clone(entry.value())).collect();
        let count = conns.len();
        for conn in conns {
            conn.stop().await;
            self.0.remove(&conn.id());
        }
        log::debug!("registry cleared: stopped={count}");
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("len", &self.0.len())
            .finish()
    }
}
