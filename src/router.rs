//! Application handlers and the table that routes requests to them.
//!
//! A [`Router`] is bound to a service id. The worker that dequeues a request
//! calls [`Router::pre_handle`], [`Router::handle`] and
//! [`Router::post_handle`] in that order on the same task. Only `handle` is
//! required; the other two default to doing nothing.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::request::Request;

/// Handler bound to a service id.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use wirepool::{request::Request, router::Router};
///
/// struct Echo;
///
/// #[async_trait]
/// impl Router for Echo {
///     async fn handle(&self, req: &Request) {
///         if let Ok(ctx) = req.context() {
///             let _ = req.reply(ctx.data.clone()).await;
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Router: Send + Sync + 'static {
    /// Runs before [`Router::handle`].
    async fn pre_handle(&self, _req: &Request) {}

    /// Handle one request.
    async fn handle(&self, req: &Request);

    /// Runs after [`Router::handle`].
    async fn post_handle(&self, _req: &Request) {}
}

/// Router that accepts every request and does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRouter;

#[async_trait]
impl Router for NoopRouter {
    async fn handle(&self, _req: &Request) {}
}

/// Errors raised while building a [`RouteTable`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// A router is already registered for the service id.
    #[error("router already registered for service {0}")]
    DuplicateRoute(u32),
}

/// Mapping from service id to [`Router`].
///
/// The table is filled before the server starts and is read-only afterwards.
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: HashMap<u32, Arc<dyn Router>>,
}

impl RouteTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Bind `router` to `service_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::DuplicateRoute`] if `service_id` already has a
    /// router; the existing binding is kept.
    pub fn register<R: Router>(&mut self, service_id: u32, router: R) -> Result<(), RouteError> {
        self.register_arc(service_id, Arc::new(router))
    }

    /// Bind an already shared router to `service_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::DuplicateRoute`] if `service_id` already has a
    /// router.
    pub fn register_arc(
        &mut self,
        service_id: u32,
        router: Arc<dyn Router>,
    ) -> Result<(), RouteError> {
        if self.routes.contains_key(&service_id) {
            return Err(RouteError::DuplicateRoute(service_id));
        }
        self.routes.insert(service_id, router);
        log::debug!("router registered: service_id={service_id}");
        Ok(())
    }

    /// Router bound to `service_id`, if any.
    #[must_use]
    pub fn get(&self, service_id: u32) -> Option<&Arc<dyn Router>> { self.routes.get(&service_id) }

    /// Number of registered routers.
    #[must_use]
    pub fn len(&self) -> usize { self.routes.len() }

    /// Return `true` when no router is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.routes.is_empty() }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.routes.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("RouteTable").field("services", &ids).finish()
    }
}
