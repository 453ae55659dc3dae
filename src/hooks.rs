//! Connection lifecycle callbacks.
//!
//! [`LifecycleHooks`] stores the optional `on_conn_start` and `on_conn_stop`
//! callbacks a server installs. Every connection runs the start hook once
//! before its first frame is read and the stop hook once while it is being
//! torn down.

use std::{fmt, future::Future, sync::Arc};

use futures::future::BoxFuture;

use crate::connection::Connection;

/// Callback invoked with the connection at a lifecycle point.
pub type ConnectionHook = Arc<dyn Fn(Arc<Connection>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Box an async closure as a [`ConnectionHook`].
pub fn connection_hook<F, Fut>(f: F) -> ConnectionHook
where
    F: Fn(Arc<Connection>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |conn| Box::pin(f(conn)))
}

/// Optional callbacks run at connection start and stop.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    /// Runs at most once per connection, after registry insertion and before
    /// any frame is processed. Skipped if the connection stops first.
    pub on_start: Option<ConnectionHook>,
    /// Runs once per connection as the first step of teardown, never before
    /// the start hook has returned.
    pub on_stop: Option<ConnectionHook>,
}

impl LifecycleHooks {
    pub(crate) async fn run_start(&self, conn: Arc<Connection>) {
        if let Some(hook) = &self.on_start {
            hook(conn).await;
        }
    }

    pub(crate) async fn run_stop(&self, conn: Arc<Connection>) {
        if let Some(hook) = &self.on_stop {
            hook(conn).await;
        }
    }
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("on_start", &self.on_start.as_ref().map(|_| "Some(<hook>)"))
            .field("on_stop", &self.on_stop.as_ref().map(|_| "Some(<hook>)"))
            .finish()
    }
}
