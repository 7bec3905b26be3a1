//! Event ingestion: line source -> channel -> parser -> store.
//!
//! Reading the external source and applying events are split into two
//! cooperating tasks joined by a bounded channel, which preserves line
//! order and lets a slow store apply backpressure to the reader instead of
//! buffering without limit. A single bad line is logged and dropped; only
//! end-of-stream (or the peer task going away) ends either loop.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use volumeter_common::error::{Result, VolumeterError};

use crate::parser::{self, ParseError};
use crate::store::SharedStore;

/// Running totals for one ingest session, logged at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Events applied to the store.
    pub applied: u64,
    /// Lines rejected by the parser.
    pub discarded: u64,
    /// Well-formed events dropped by the address filter or because their
    /// protocol family is not tracked.
    pub skipped: u64,
}

/// Pumps lines from the external event source into the channel.
///
/// Returns cleanly on end-of-stream or once the receiving side is gone.
///
/// # Errors
///
/// Returns an error if reading from the source fails.
pub async fn pump_lines<R>(reader: R, tx: mpsc::Sender<String>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = lines
            .next_line()
            .await
            .map_err(|e| VolumeterError::io("reading event source", e))?;
        match line {
            Some(line) => {
                if tx.send(line).await.is_err() {
                    tracing::debug!("ingest loop gone, stopping source reader");
                    return Ok(());
                }
            }
            None => {
                tracing::info!("event source reached end of stream");
                return Ok(());
            }
        }
    }
}

/// Consumes lines from the channel until it closes, applying every
/// well-formed event addressed at `monitored_addr` to the store.
///
/// Parse failures and mismatched or untracked events never terminate the
/// loop; they are counted and dropped.
pub async fn run_ingest(
    mut rx: mpsc::Receiver<String>,
    store: SharedStore,
    monitored_addr: &str,
) -> IngestStats {
    let mut stats = IngestStats::default();
    while let Some(line) = rx.recv().await {
        if line.trim().is_empty() {
            continue;
        }
        match parser::parse_event(&line) {
            Ok(Some(event)) if event.dst_addr == monitored_addr => {
                store.apply(&event).await;
                stats.applied += 1;
            }
            Ok(Some(event)) => {
                tracing::trace!(dst = %event.dst_addr, "event for unmonitored address dropped");
                stats.skipped += 1;
            }
            Ok(None) => {
                stats.skipped += 1;
            }
            Err(error) => {
                log_parse_error(&error, &line);
                stats.discarded += 1;
            }
        }
    }
    tracing::info!(
        applied = stats.applied,
        discarded = stats.discarded,
        skipped = stats.skipped,
        "ingest loop finished"
    );
    stats
}

fn log_parse_error(error: &ParseError, line: &str) {
    // Expected noise on a live feed; keep it below info.
    tracing::debug!(%error, line, "discarding malformed event line");
}
