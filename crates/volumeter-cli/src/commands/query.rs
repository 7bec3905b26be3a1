//! `volumeter query` — one-shot control client.
//!
//! Opens a connection to a running daemon, sends a single command line,
//! prints whatever comes back, and exits.

use anyhow::Context;
use clap::Args;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use volumeter_common::constants::DEFAULT_CONTROL_PORT;

/// Arguments for the `query` command.
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Command to send: get_data, reset, or get_data_and_reset.
    #[arg(short, long, default_value = "get_data")]
    pub command: String,

    /// Host the daemon's control listener runs on.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Control listener port.
    #[arg(short, long, default_value_t = DEFAULT_CONTROL_PORT)]
    pub port: u16,
}

/// Executes the `query` command.
///
/// # Errors
///
/// Returns an error if the daemon cannot be reached or the exchange fails.
pub async fn execute(args: QueryArgs) -> anyhow::Result<()> {
    let target = format!("{}:{}", args.host, args.port);
    let mut stream = TcpStream::connect(&target)
        .await
        .with_context(|| format!("connecting to volumeter at {target}"))?;

    stream
        .write_all(format!("{}\n", args.command).as_bytes())
        .await
        .context("sending command")?;

    let mut response = String::new();
    let _ = stream
        .read_to_string(&mut response)
        .await
        .context("reading response")?;

    println!("{response}");
    Ok(())
}
