//! Accept loop with admission control.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use log::warn;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::{Duration, sleep},
};
use tokio_util::sync::CancellationToken;

use super::backoff::BackoffConfig;
use crate::{
    connection::{Connection, ConnectionEnv},
    metrics,
    registry::ConnectionId,
};

/// Source of incoming connections consumed by the accept loop.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

#[derive(Debug)]
pub(in crate::server) struct AcceptLoopOptions {
    pub max_conn: usize,
    pub shutdown: CancellationToken,
    pub backoff: BackoffConfig,
}

/// Per-loop state threaded through each iteration.
struct Acceptor<'a, L> {
    listener: &'a L,
    env: &'a Arc<ConnectionEnv>,
    options: &'a AcceptLoopOptions,
    next_id: u32,
}

/// Accept connections until `options.shutdown` is cancelled.
///
/// Connections beyond `max_conn` are closed as soon as they are accepted,
/// before a [`Connection`] is built. Admitted connections receive ids
/// counting up from zero. Accept failures back off exponentially.
pub(in crate::server) async fn accept_loop<L>(
    listener: Arc<L>,
    env: Arc<ConnectionEnv>,
    options: AcceptLoopOptions,
) where
    L: AcceptListener + 'static,
{
    let options = AcceptLoopOptions {
        backoff: options.backoff.normalized(),
        ..options
    };
    let mut acceptor = Acceptor {
        listener: listener.as_ref(),
        env: &env,
        options: &options,
        next_id: 0,
    };
    let mut delay = options.backoff.initial_delay;
    while let Some(next_delay) = acceptor.iteration(delay).await {
        delay = next_delay;
    }
}

impl<L: AcceptListener> Acceptor<'_, L> {
    async fn iteration(&mut self, delay: Duration) -> Option<Duration> {
        select! {
            biased;

            () = self.options.shutdown.cancelled() => None,
            res = self.listener.accept() => Some(match res {
                Ok((stream, peer_addr)) => {
                    self.admit(stream, peer_addr);
                    self.options.backoff.initial_delay
                }
                Err(e) => {
                    let local_addr = self.listener.local_addr().ok();
                    warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                    metrics::inc_errors();
                    sleep(delay).await;
                    self.options.backoff.next_delay(delay)
                }
            }),
        }
    }

    fn admit(&mut self, stream: TcpStream, peer_addr: SocketAddr) {
        let active = self.env.registry.len();
        if active >= self.options.max_conn {
            warn!(
                "connection rejected: peer_addr={peer_addr}, active={active}, max_conn={}",
                self.options.max_conn
            );
            metrics::inc_rejected_connections();
            drop(stream);
            return;
        }
        let registry = &self.env.registry;
        let id = allocate_id(&mut self.next_id, |id| registry.contains(id));
        Connection::start(stream, peer_addr, id, self.env);
    }
}

/// Take the next id from `next`, skipping ids still `in_use`.
///
/// Ids wrap after `u32::MAX`. Admission keeps the live count below
/// `max_conn`, so a free id is always found.
fn allocate_id(next: &mut u32, in_use: impl Fn(ConnectionId) -> bool) -> ConnectionId {
    loop {
        let id = ConnectionId::new(*next);
        *next = next.wrapping_add(1);
        if !in_use(id) {
            return id;
        }
    }
}
