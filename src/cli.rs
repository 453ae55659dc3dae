//! Command line interface for the `wirepool` demo server.
//!
//! Also compiled by `build.rs` to render the man page.

use std::path::PathBuf;

use clap::Parser;

/// Command line arguments for the `wirepool` binary.
#[derive(Debug, Parser)]
#[command(
    name = "wirepool",
    version,
    about = "Demo server answering service 1 / method 1 with a greeting"
)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Listen host, overriding the configuration.
    #[arg(long)]
    pub host: Option<String>,
    /// Listen port, overriding the configuration.
    #[arg(short, long)]
    pub port: Option<u16>,
}
