//! Top-level error type for embedding applications.
//!
//! Each module reports its own error enum. [`Error`] gathers the ones that
//! can stop a server from starting so a `main` can use `?` throughout.

use thiserror::Error;

use crate::{config::ConfigError, router::RouteError, server::ServerError};

/// Startup failure of a `wirepool` server.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Two routers were bound to the same service id.
    #[error(transparent)]
    Route(#[from] RouteError),
    /// The listener could not be bound.
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Result alias using [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
