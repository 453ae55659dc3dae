//! Helpers for exercising a `wirepool` server in integration tests.
//!
//! [`TestServer`] runs a configured [`Server`](wirepool::server::Server) on
//! a loopback port and shuts it down on request. The frame helpers build raw
//! wire bytes, including deliberately broken ones, for tests that need to
//! bypass [`Client`](wirepool::client::Client).
//!
//! ```rust,no_run
//! use wirepool::{client::Client, config::ServerConfig, server::Server};
//! use wirepool_testing::TestServer;
//!
//! # async fn example() {
//! let server = TestServer::start(Server::new(ServerConfig::default())).await;
//! let mut client = Client::connect(server.addr(), 4096).await.expect("connect");
//! server.shutdown().await;
//! # }
//! ```

pub mod frames;
pub mod logging;
pub mod server;

pub use frames::{corrupt_checksum, encode_context, encode_payload};
pub use logging::{LoggerHandle, logger};
pub use server::{TestServer, loopback_config, unused_listener, wait_until};
