//! Tokio-based TCP server.
//!
//! A [`Server`] is configured while [`Unbound`]: routers and lifecycle hooks
//! are registered, then [`Server::bind`] produces a [`Bound`] server that can
//! run. Running starts the dispatcher's workers first and only then the
//! accept loop, so no request is ever queued with no worker alive.
//!
//! The server owns its [`ConnectionRegistry`]; [`Server::registry`] hands out
//! a shared reference for inspection and tests.

use std::{future::Future, sync::Arc};

use tokio::{net::TcpListener, sync::oneshot};

use crate::{
    config::ServerConfig,
    connection::Connection,
    hooks::{LifecycleHooks, connection_hook},
    registry::ConnectionRegistry,
    router::{RouteError, RouteTable, Router},
};

mod binding;
pub mod error;
mod runtime;

pub use error::ServerError;
/// Re-exported configuration types for server backoff behaviour.
pub use runtime::BackoffConfig;

/// TCP server for the checksummed frame protocol.
///
/// The typestate `S` records whether a listener has been bound. Only a
/// [`Bound`] server exposes [`Server::run`].
pub struct Server<S: ServerState = Unbound> {
    pub(crate) config: ServerConfig,
    pub(crate) routes: RouteTable,
    pub(crate) hooks: LifecycleHooks,
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) backoff: BackoffConfig,
    /// Fired once the workers and the accept loop are running.
    ///
    /// A `oneshot::Sender` transmits a single notification, so a new sender
    /// must be supplied each time a server is started.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

impl Server<Unbound> {
    /// Create an unbound server from a configuration snapshot.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            routes: RouteTable::new(),
            hooks: LifecycleHooks::default(),
            registry: Arc::new(ConnectionRegistry::new()),
            backoff: BackoffConfig::default(),
            ready_tx: None,
            state: Unbound,
        }
    }

    /// Bind `router` to `service_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::DuplicateRoute`] if the service id is already
    /// bound. Callers treat this as a fatal configuration error.
    ///
    /// # Examples
    ///
    /// ```
    /// use wirepool::{config::ServerConfig, router::NoopRouter, server::Server};
    ///
    /// let server = Server::new(ServerConfig::default())
    ///     .register_router(1, NoopRouter)
    ///     .expect("first binding");
    /// assert!(server.register_router(1, NoopRouter).is_err());
    /// ```
    pub fn register_router<R: Router>(mut self, service_id: u32, router: R) -> Result<Self, RouteError> {
        self.routes.register(service_id, router)?;
        Ok(self)
    }
}

impl<S: ServerState> Server<S> {
    /// Install the hook run when a connection starts.
    #[must_use]
    pub fn on_conn_start<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<Connection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.on_start = Some(connection_hook(hook));
        self
    }

    /// Install the hook run when a connection stops.
    #[must_use]
    pub fn on_conn_stop<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<Connection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.on_stop = Some(connection_hook(hook));
        self
    }

    /// Override the accept-error back-off.
    #[must_use]
    pub fn accept_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Register a channel notified once the server is accepting.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Configuration snapshot.
    #[must_use]
    pub fn config(&self) -> &ServerConfig { &self.config }

    /// Registry of live connections.
    #[must_use]
    pub fn registry(&self) -> Arc<ConnectionRegistry> { Arc::clone(&self.registry) }
}

impl<S: ServerState + std::fmt::Debug> std::fmt::Debug for Server<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.config.name)
            .field("routes", &self.routes)
            .field("hooks", &self.hooks)
            .field("backoff", &self.backoff)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_util;
