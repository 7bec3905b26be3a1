//! `volumeter run` — the accounting daemon.
//!
//! Wires the pipeline together: event source (spawned conntrack or stdin)
//! -> line channel -> ingest loop -> shared store <- control server. Runs
//! until interrupted; if the event source ends first, the daemon keeps
//! serving the last counters until interrupted.

use std::net::IpAddr;
use std::process::Stdio;

use anyhow::Context;
use clap::Args;
use tokio::io::BufReader;
use tokio::process::Command as SourceCommand;
use tokio::sync::mpsc;
use volumeter_common::config::VolumeterConfig;
use volumeter_common::constants::{
    CONNTRACK_ARGS, CONNTRACK_COMMAND, DEFAULT_BIND_ADDR, DEFAULT_CONTROL_PORT,
    DEFAULT_READ_TIMEOUT_SECS, LINE_CHANNEL_CAPACITY,
};
use volumeter_engine::ingest;
use volumeter_engine::server::ControlServer;
use volumeter_engine::store::SharedStore;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Public address whose inbound traffic is accounted.
    #[arg(short, long)]
    pub address: String,

    /// Control listener port.
    #[arg(short, long, default_value_t = DEFAULT_CONTROL_PORT)]
    pub port: u16,

    /// Control listener bind address.
    #[arg(long, default_value = DEFAULT_BIND_ADDR)]
    pub bind: IpAddr,

    /// Read event lines from stdin instead of spawning conntrack.
    #[arg(long)]
    pub stdin: bool,

    /// Per-connection read timeout for the control server, in seconds.
    #[arg(long, default_value_t = DEFAULT_READ_TIMEOUT_SECS)]
    pub read_timeout: u64,
}

/// Executes the `run` command.
///
/// # Errors
///
/// Returns an error if the control listener cannot be bound or the
/// conntrack source cannot be spawned; everything past startup is handled
/// per line or per connection.
pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    let mut config = VolumeterConfig::new(&args.address)?;
    config.bind_addr = args.bind;
    config.control_port = args.port;
    config.read_timeout_secs = args.read_timeout;

    let store = SharedStore::new();
    let server =
        ControlServer::bind(&config.control_addr(), store.clone(), config.read_timeout()).await?;
    let server_task = tokio::spawn(server.run());

    let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
    let (reader_task, mut child) = if args.stdin {
        tracing::info!("reading events from stdin");
        let reader = BufReader::new(tokio::io::stdin());
        (tokio::spawn(ingest::pump_lines(reader, tx)), None)
    } else {
        let mut child = SourceCommand::new(CONNTRACK_COMMAND)
            .args(CONNTRACK_ARGS)
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning `{CONNTRACK_COMMAND}`"))?;
        let stdout = child
            .stdout
            .take()
            .context("conntrack stdout unavailable")?;
        tracing::info!(command = CONNTRACK_COMMAND, "event source spawned");
        let reader = BufReader::new(stdout);
        (tokio::spawn(ingest::pump_lines(reader, tx)), Some(child))
    };

    let monitored = config.monitored_addr.clone();
    let ingest_store = store.clone();
    let mut ingest_task =
        tokio::spawn(async move { ingest::run_ingest(rx, ingest_store, &monitored).await });

    tracing::info!(
        monitored = %config.monitored_addr,
        control = %config.control_addr(),
        "volumeter running"
    );

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("listening for shutdown signal")?;
            tracing::info!("shutdown signal received");
        }
        stats = &mut ingest_task => {
            match stats {
                Ok(stats) => tracing::info!(
                    applied = stats.applied,
                    discarded = stats.discarded,
                    skipped = stats.skipped,
                    "event source ended; serving last counters until interrupted"
                ),
                Err(error) => tracing::warn!(%error, "ingest task failed"),
            }
            tokio::signal::ctrl_c()
                .await
                .context("listening for shutdown signal")?;
            tracing::info!("shutdown signal received");
        }
    }

    server_task.abort();
    reader_task.abort();
    ingest_task.abort();
    if let Some(child) = child.as_mut() {
        let _ = child.kill().await;
    }
    tracing::info!("volumeter stopped");
    Ok(())
}
