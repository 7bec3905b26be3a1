//! # volumeter — per-port conntrack traffic accounting.
//!
//! Follows the kernel connection-tracking event stream, accumulates
//! packet/byte volumes per destination port and protocol for one monitored
//! address, and serves snapshot/reset commands over a small TCP control
//! protocol.

mod commands;

use clap::Parser;

use crate::commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    commands::execute(cli).await
}
