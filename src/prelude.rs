//! Convenience imports for writing a server.
//!
//! # Examples
//!
//! ```rust,no_run
//! use wirepool::prelude::*;
//!
//! struct Greeter;
//!
//! #[async_trait::async_trait]
//! impl Router for Greeter {
//!     async fn handle(&self, req: &Request) { let _ = req.reply(b"hi".to_vec()).await; }
//! }
//!
//! fn build() -> Result<Server> { Ok(Server::new(ServerConfig::default()).register_router(1, Greeter)?) }
//! ```

pub use crate::{
    config::ServerConfig,
    connection::{Connection, ConnectionError},
    context::{Context, ResultCode},
    error::{Error, Result},
    request::Request,
    router::{NoopRouter, Router},
    server::{Server, ServerError},
};
