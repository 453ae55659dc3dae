//! Server configuration snapshot.
//!
//! [`ServerConfig`] is read once, usually from a TOML file, and handed to the
//! server as an immutable value. Every field has a default, so a file only
//! needs the keys it overrides.

use std::{
    fs,
    io,
    net::{SocketAddr, ToSocketAddrs},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::dispatch::WorkerPoolConfig;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The file is not valid TOML for [`ServerConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Settings consumed by the server.
///
/// # Examples
///
/// ```
/// use wirepool::config::ServerConfig;
///
/// let config = ServerConfig::from_toml_str("port = 7777\nmax_conn = 2").expect("valid");
/// assert_eq!(config.port, 7777);
/// assert_eq!(config.max_conn, 2);
/// assert_eq!(config.worker_pool_size, 10);
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Server name, used in logs.
    pub name: String,
    /// Server version, used in logs.
    pub version: String,
    /// Address to listen on.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Maximum number of simultaneous connections.
    pub max_conn: usize,
    /// Largest accepted frame payload in bytes.
    pub max_package_size: usize,
    /// Number of dispatcher workers. Zero spawns one task per request.
    pub worker_pool_size: usize,
    /// Capacity of each worker queue.
    pub max_worker_task_len: usize,
    /// Optional per-request handler timeout in milliseconds.
    pub handler_timeout_ms: Option<u64>,
    /// Optional listen address for the Prometheus exporter.
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "wirepool server".into(),
            version: "V1.0".into(),
            host: "0.0.0.0".into(),
            port: 9999,
            max_conn: 1000,
            max_package_size: crate::codec::DEFAULT_MAX_PACKAGE_SIZE,
            worker_pool_size: 10,
            max_worker_task_len: 1024,
            handler_timeout_ms: None,
            metrics_addr: None,
        }
    }
}

impl ServerConfig {
    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> { Ok(toml::from_str(text)?) }

    /// Load a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Resolve `host:port` to a socket address.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if the host does not resolve.
    pub fn listen_addr(&self) -> io::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no address for host {}", self.host),
                )
            })
    }

    /// Worker pool sizing derived from this configuration.
    #[must_use]
    pub fn worker_pool(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            workers: self.worker_pool_size,
            queue_len: self.max_worker_task_len,
            handler_timeout: self.handler_timeout_ms.map(Duration::from_millis),
        }
    }
}
