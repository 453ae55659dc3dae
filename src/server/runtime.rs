//! Runtime control for [`Server`].

mod accept;
mod backoff;

use std::sync::Arc;

#[cfg(test)]
pub(super) use accept::MockAcceptListener;
pub(super) use accept::{AcceptLoopOptions, accept_loop};
pub use backoff::BackoffConfig;
use log::{info, warn};
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Bound, Server, ServerError};
use crate::{
    codec::PacketCodec,
    connection::ConnectionEnv,
    dispatch::Dispatcher,
};

impl Server<Bound> {
    /// Run the server until Ctrl+C is received.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wirepool::{config::ServerConfig, server::Server};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), wirepool::server::ServerError> {
    /// Server::new(ServerConfig::default())
    ///     .bind(([127, 0, 0, 1], 9999).into())?
    ///     .run()
    ///     .await
    /// # }
    /// ```
    ///
    /// Attempting to run a server without binding fails to compile:
    ///
    /// ```compile_fail
    /// use wirepool::{config::ServerConfig, server::Server};
    ///
    /// async fn try_run() {
    ///     let _ = Server::new(ServerConfig::default()).run().await;
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Accept failures are retried with back-off and do not surface; the
    /// `Result` is kept for parity with [`Server::run_with_shutdown`].
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until `shutdown` resolves.
    ///
    /// Startup order: workers, then the accept loop, then the ready signal.
    /// Shutdown order: stop accepting, stop every connection, stop the
    /// workers, wait for every spawned task.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio::sync::oneshot;
    /// use wirepool::{config::ServerConfig, server::Server};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), wirepool::server::ServerError> {
    /// let server = Server::new(ServerConfig::default()).bind(([127, 0, 0, 1], 0).into())?;
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn(server.run_with_shutdown(async {
    ///     let _ = rx.await;
    /// }));
    /// let _ = tx.send(());
    /// handle.await.expect("join server task")?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok(())`.
    pub async fn run_with_shutdown<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            config,
            routes,
            hooks,
            registry,
            backoff,
            ready_tx,
            state: Bound { listener },
        } = self;
        let tracker = TaskTracker::new();
        let workers_token = CancellationToken::new();
        let accept_token = CancellationToken::new();

        let dispatcher = Dispatcher::start(routes, config.worker_pool(), &tracker, &workers_token);
        let env = Arc::new(ConnectionEnv::new(
            PacketCodec::new(config.max_package_size),
            hooks,
            Arc::clone(&registry),
            dispatcher,
            tracker.clone(),
        ));
        let local_addr = listener.local_addr().ok();
        let accept = tracker.spawn(accept_loop(
            listener,
            env,
            AcceptLoopOptions {
                max_conn: config.max_conn,
                shutdown: accept_token.clone(),
                backoff,
            },
        ));
        info!(
            "server started: name={}, version={}, addr={local_addr:?}, max_conn={}, workers={}",
            config.name, config.version, config.max_conn, config.worker_pool_size
        );

        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        shutdown.await;
        info!("server stopping: name={}, active={}", config.name, registry.len());
        accept_token.cancel();
        if let Err(e) = accept.await {
            warn!("accept loop ended abnormally: error={e}");
        }
        registry.clear_all().await;
        workers_token.cancel();
        tracker.close();
        tracker.wait().await;
        info!("server stopped: name={}", config.name);
        Ok(())
    }
}
