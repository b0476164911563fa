//! `hivewire` queen binary.
//!
//! Listens for cells and runs until Ctrl+C.

mod cli;

use std::{process::ExitCode, time::Duration};

use clap::Parser;
use hivewire::queen::{Queen, QueenError};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "queen failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: cli::Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(addr) = cli.metrics_addr {
        install_metrics(addr)?;
    }

    let listener = TcpListener::bind(cli.bind)
        .await
        .map_err(|source| QueenError::Bind {
            addr: cli.bind,
            source,
        })?;
    Queen::builder()
        .max_frame_length(cli.max_frame_length)
        .band_wait(Duration::from_millis(cli.band_wait_ms))
        .build()
        .run(listener)
        .await?;
    Ok(())
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: std::net::SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!(%addr, "metrics exporter listening");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(addr: std::net::SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    tracing::warn!(%addr, "built without the metrics feature; ignoring --metrics-addr");
    Ok(())
}
