#![doc(html_root_url = "https://docs.rs/wirepool/latest")]
//! Public API for the `wirepool` library.
//!
//! This crate provides a TCP application server for a length-prefixed,
//! CRC-32 checked binary protocol. Frames are decoded per connection,
//! routed by service id and handled on a fixed worker pool that preserves
//! per-connection ordering.

pub mod byte_order;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod message;
pub mod metrics;
pub mod panic;
pub mod pool;
pub mod prelude;
pub mod registry;
pub mod request;
pub mod router;
pub mod server;

pub use codec::{CodecError, PacketCodec};
pub use connection::{Connection, ConnectionError};
pub use context::{Context, ResultCode};
pub use error::{Error, Result};
pub use message::Message;
pub use metrics::{CONNECTIONS_ACTIVE, CONNECTIONS_REJECTED, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
pub use registry::{ConnectionId, ConnectionRegistry};
pub use router::{RouteError, Router};
pub use server::{Server, ServerError};
