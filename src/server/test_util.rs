//! Test helpers shared across server modules.

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use rstest::fixture;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Bound, Server};
use crate::{
    codec::PacketCodec,
    config::ServerConfig,
    connection::ConnectionEnv,
    dispatch::{Dispatcher, WorkerPoolConfig},
    hooks::LifecycleHooks,
    registry::ConnectionRegistry,
    router::RouteTable,
};

#[fixture]
pub fn local_config() -> ServerConfig {
    ServerConfig {
        host: Ipv4Addr::LOCALHOST.to_string(),
        port: 0,
        worker_pool_size: 2,
        max_worker_task_len: 8,
        ..ServerConfig::default()
    }
}

#[fixture]
/// Returns a bound [`StdTcpListener`] on a free port for use in tests.
///
/// Keeping the listener bound prevents race conditions where another
/// process could claim the port between discovery and use.
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

pub fn bind_server(config: ServerConfig, listener: StdTcpListener) -> Server<Bound> {
    Server::new(config)
        .bind_listener(listener)
        .expect("Failed to bind")
}

/// Connection environment backed by an empty route table.
pub fn test_env(
    registry: Arc<ConnectionRegistry>,
    tracker: &TaskTracker,
    shutdown: &CancellationToken,
) -> Arc<ConnectionEnv> {
    let dispatcher = Dispatcher::start(
        RouteTable::new(),
        WorkerPoolConfig::default(),
        tracker,
        shutdown,
    );
    Arc::new(ConnectionEnv::new(
        PacketCodec::default(),
        LifecycleHooks::default(),
        registry,
        dispatcher,
        tracker.clone(),
    ))
}
