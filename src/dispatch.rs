//! Worker pool that runs routers.
//!
//! [`Dispatcher::start`] spawns `W` worker tasks, each owning a bounded
//! queue of capacity `Q`. A request from connection `id` always goes to
//! worker `id % W`, so requests from one connection are handled one at a
//! time and in the order they were read, while different connections run in
//! parallel on different workers. [`Dispatcher::submit`] waits when the
//! chosen queue is full, which stalls only the submitting connection's
//! reader.
//!
//! With `W == 0` every request is spawned as its own task instead, with no
//! ordering guarantee.

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use log::{debug, error, warn};
use thiserror::Error;
use tokio::{select, sync::mpsc, time::timeout};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    context::ResultCode,
    metrics,
    registry::ConnectionId,
    request::Request,
    router::{RouteTable, Router},
};

/// Sizing of the worker pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of workers. Zero selects spawn-per-request mode.
    pub workers: usize,
    /// Capacity of each worker queue.
    pub queue_len: usize,
    /// Upper bound on one pre/handle/post chain. `None` waits indefinitely.
    pub handler_timeout: Option<Duration>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_len: 1024,
            handler_timeout: None,
        }
    }
}

/// Errors returned by [`Dispatcher::submit`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The target worker has shut down.
    #[error("worker {0} is not running")]
    WorkerClosed(usize),
}

/// Index of the worker that serves `conn_id` in a pool of `workers`.
///
/// # Examples
///
/// ```
/// use wirepool::{dispatch::worker_index, registry::ConnectionId};
///
/// assert_eq!(worker_index(ConnectionId::new(5), 4), 1);
/// ```
#[must_use]
pub fn worker_index(conn_id: ConnectionId, workers: usize) -> usize {
    if workers == 0 {
        return 0;
    }
    conn_id.as_u32() as usize % workers
}

/// Handle used to submit requests to the worker pool.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    routes: Arc<RouteTable>,
    queues: Vec<mpsc::Sender<Request>>,
    handler_timeout: Option<Duration>,
    tracker: TaskTracker,
}

impl Dispatcher {
    /// Freeze `routes` and spawn the workers on `tracker`.
    ///
    /// Workers exit when `shutdown` is cancelled or every sender is dropped.
    #[must_use]
    pub fn start(
        routes: RouteTable,
        config: WorkerPoolConfig,
        tracker: &TaskTracker,
        shutdown: &CancellationToken,
    ) -> Self {
        let routes = Arc::new(routes);
        let queue_len = config.queue_len.max(1);
        let queues = (0..config.workers)
            .map(|worker| {
                let (tx, rx) = mpsc::channel(queue_len);
                tracker.spawn(worker_loop(
                    worker,
                    rx,
                    Arc::clone(&routes),
                    config.handler_timeout,
                    shutdown.clone(),
                ));
                tx
            })
            .collect();
        debug!(
            "worker pool started: workers={}, queue_len={queue_len}, routes={}",
            config.workers,
            routes.len()
        );
        Self {
            inner: Arc::new(Inner {
                routes,
                queues,
                handler_timeout: config.handler_timeout,
                tracker: tracker.clone(),
            }),
        }
    }

    /// Number of workers.
    #[must_use]
    pub fn workers(&self) -> usize { self.inner.queues.len() }

    /// Worker that serves `conn_id`.
    #[must_use]
    pub fn worker_for(&self, conn_id: ConnectionId) -> usize {
        worker_index(conn_id, self.workers())
    }

    /// Queue `req` on its connection's worker, waiting while the queue is
    /// full.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::WorkerClosed`] if that worker has exited.
    pub async fn submit(&self, req: Request) -> Result<(), DispatchError> {
        let inner = &self.inner;
        if inner.queues.is_empty() {
            let routes = Arc::clone(&inner.routes);
            let handler_timeout = inner.handler_timeout;
            inner
                .tracker
                .spawn(async move { process(&routes, req, handler_timeout).await });
            return Ok(());
        }
        let worker = self.worker_for(req.connection().id());
        let queue = inner
            .queues
            .get(worker)
            .ok_or(DispatchError::WorkerClosed(worker))?;
        queue
            .send(req)
            .await
            .map_err(|_| DispatchError::WorkerClosed(worker))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.inner.queues.len())
            .field("routes", &self.inner.routes)
            .field("handler_timeout", &self.inner.handler_timeout)
            .finish()
    }
}

async fn worker_loop(
    worker: usize,
    mut queue: mpsc::Receiver<Request>,
    routes: Arc<RouteTable>,
    handler_timeout: Option<Duration>,
    shutdown: CancellationToken,
) {
    loop {
        let req = select! {
            biased;

            () = shutdown.cancelled() => break,
            next = queue.recv() => match next {
                Some(req) => req,
                None => break,
            },
        };
        process(&routes, req, handler_timeout).await;
    }
    debug!("worker stopped: worker={worker}");
}

/// Route `req` and run its handler chain, containing panics and timeouts.
///
/// Context decoding happens inside the unwind guard as well, so no request
/// can take its worker down.
async fn process(routes: &RouteTable, req: Request, handler_timeout: Option<Duration>) {
    let conn_id = req.connection().id();
    let outcome = AssertUnwindSafe(route(routes, &req, handler_timeout))
        .catch_unwind()
        .await;
    if let Err(panic) = outcome {
        let panic_msg = crate::panic::format_panic(panic);
        metrics::inc_errors();
        error!("handler panicked: conn_id={conn_id}, panic={panic_msg}");
        tracing::error!(%conn_id, panic = %panic_msg, "handler panicked");
    }
}

async fn route(routes: &RouteTable, req: &Request, handler_timeout: Option<Duration>) {
    let conn_id = req.connection().id();
    let service_id = match req.service_id() {
        Ok(id) => id,
        Err(e) => {
            warn!("dropping request with invalid context: conn_id={conn_id}, error={e}");
            metrics::inc_errors();
            if let Err(e) = req
                .connection()
                .send_error_code(ResultCode::ErrUnpackContext)
                .await
            {
                debug!("context error reply not sent: conn_id={conn_id}, error={e}");
            }
            return;
        }
    };
    let Some(router) = routes.get(service_id) else {
        warn!("no router registered: service_id={service_id}, conn_id={conn_id}");
        return;
    };

    let chain = run_chain(router.as_ref(), req);
    match handler_timeout {
        Some(limit) => {
            if timeout(limit, chain).await.is_err() {
                warn!(
                    "handler timed out: service_id={service_id}, conn_id={conn_id}, \
                     timeout={limit:?}"
                );
                metrics::inc_errors();
            }
        }
        None => chain.await,
    }
}

async fn run_chain(router: &dyn Router, req: &Request) {
    router.pre_handle(req).await;
    router.handle(req).await;
    router.post_handle(req).await;
}
