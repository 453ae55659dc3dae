//! Demo `wirepool` server.
//!
//! Service 1, method 1 answers `Hello <name>.` where `<name>` is the request
//! data. Connection start and stop are logged, and the server runs until
//! Ctrl+C.

mod cli;

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use log::{info, warn};
use wirepool::{
    config::ServerConfig,
    connection::Connection,
    request::Request,
    router::Router,
    server::Server,
};

const HELLO_SERVICE: u32 = 1;
const HELLO_METHOD: u32 = 1;

struct HelloRouter;

#[async_trait]
impl Router for HelloRouter {
    async fn handle(&self, req: &Request) {
        let Ok(ctx) = req.context() else { return };
        if ctx.method_id != HELLO_METHOD {
            warn!("unknown method: service_id={}, method_id={}", ctx.service_id, ctx.method_id);
            return;
        }
        let name = String::from_utf8_lossy(&ctx.data);
        if let Err(e) = req.reply(format!("Hello {name}.")).await {
            warn!("reply failed: conn_id={}, error={e}", req.connection().id());
        }
    }
}

async fn log_start(conn: Arc<Connection>) {
    info!("client connected: conn_id={}, peer_addr={}", conn.id(), conn.peer_addr());
}

async fn log_stop(conn: Arc<Connection>) {
    info!("client disconnected: conn_id={}", conn.id());
}

#[cfg(feature = "metrics")]
fn install_exporter(config: &ServerConfig) {
    let Some(addr) = config.metrics_addr else { return };
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => info!("metrics exporter listening: addr={addr}"),
        Err(e) => warn!("metrics exporter not started: error={e}"),
    }
}

#[tokio::main]
async fn main() -> wirepool::Result<()> {
    // Enable structured logging for the demo binary.
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = cli::Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_toml_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    #[cfg(feature = "metrics")]
    install_exporter(&config);

    Server::new(config)
        .register_router(HELLO_SERVICE, HelloRouter)?
        .on_conn_start(log_start)
        .on_conn_stop(log_stop)
        .bind_configured()?
        .run()
        .await?;
    Ok(())
}
