//! Command line interface for the `hivewire` queen binary.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `hivewire` binary.
#[derive(Debug, Parser)]
#[command(name = "hivewire", version, about = "Run a hivewire queen")]
pub struct Cli {
    /// Address to accept cell connections on.
    #[arg(short, long, default_value = "127.0.0.1:7700")]
    pub bind: SocketAddr,

    /// Largest frame accepted from a cell, in bytes.
    #[arg(long, default_value_t = 1024 * 1024)]
    pub max_frame_length: usize,

    /// Milliseconds a request waits for a cell to open a band.
    #[arg(long, default_value_t = 5000)]
    pub band_wait_ms: u64,

    /// Expose Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}
