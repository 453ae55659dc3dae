//! Running a server for the duration of a test.

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
    time::Duration,
};

use tokio::{sync::oneshot, task::JoinHandle, time::timeout};
use wirepool::{
    config::ServerConfig,
    registry::ConnectionRegistry,
    server::{Server, ServerError, Unbound},
};

/// Bind a listener to an unused loopback port.
///
/// # Errors
///
/// Returns any IO error encountered while binding.
pub fn unused_listener() -> std::io::Result<StdTcpListener> {
    StdTcpListener::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0))
}

/// Default configuration pointed at the loopback interface.
#[must_use]
pub fn loopback_config() -> ServerConfig {
    ServerConfig {
        host: Ipv4Addr::LOCALHOST.to_string(),
        port: 0,
        ..ServerConfig::default()
    }
}

/// Poll `check` every few milliseconds until it holds.
///
/// # Panics
///
/// Panics if `check` does not hold within one second.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    timeout(Duration::from_secs(1), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

/// A server running on a background task.
pub struct TestServer {
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Bind `server` to an unused loopback port, run it and wait until it
    /// accepts connections.
    ///
    /// # Panics
    ///
    /// Panics if binding fails or the server does not become ready.
    pub async fn start(server: Server<Unbound>) -> Self {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop, stop_rx) = oneshot::channel::<()>();
        let registry = server.registry();
        let server = server
            .ready_signal(ready_tx)
            .bind_listener(unused_listener().expect("bind loopback"))
            .expect("configure listener");
        let addr = server.local_addr().expect("bound address");
        let handle = tokio::spawn(server.run_with_shutdown(async {
            let _ = stop_rx.await;
        }));
        timeout(Duration::from_secs(1), ready_rx)
            .await
            .expect("server ready in time")
            .expect("ready signal sent");
        Self {
            addr,
            registry,
            stop,
            handle,
        }
    }

    /// Address the server listens on.
    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Registry of the running server.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> { &self.registry }

    /// Signal shutdown and wait for the server to finish.
    ///
    /// # Panics
    ///
    /// Panics if the server task fails or does not stop within one second.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        timeout(Duration::from_secs(1), self.handle)
            .await
            .expect("server stopped in time")
            .expect("server task joined")
            .expect("server run succeeded");
    }
}
