//! TCP control protocol: one command per connection.
//!
//! A controller connects, sends one line (`GET_DATA`, `RESET`, or
//! `GET_DATA_AND_RESET`, case-insensitive), receives one response, and the
//! connection closes. Data commands answer with the snapshot JSON;
//! `GET_DATA_AND_RESET` answers with the pre-reset snapshot. Connections
//! that stay silent past the read timeout, disconnect early, or fail on
//! I/O are dropped without touching the store.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use volumeter_common::constants::{RESET_ACK, UNKNOWN_COMMAND};
use volumeter_common::error::{Result, VolumeterError};

use crate::store::SharedStore;

/// A control command received from a controller connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Read-only snapshot of all counters.
    GetData,
    /// Discard all counters.
    Reset,
    /// Snapshot and reset as one atomic unit.
    GetDataAndReset,
    /// Anything else; answered with a fixed literal, no state effect.
    Unknown,
}

impl Command {
    /// Parses one command line, case-insensitively.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "get_data" => Self::GetData,
            "reset" => Self::Reset,
            "get_data_and_reset" => Self::GetDataAndReset,
            _ => Self::Unknown,
        }
    }
}

/// The control listener bound to its address, ready to serve.
#[derive(Debug)]
pub struct ControlServer {
    listener: TcpListener,
    store: SharedStore,
    read_timeout: Duration,
}

impl ControlServer {
    /// Binds the control listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound; this is the one
    /// startup condition the daemon treats as fatal.
    pub async fn bind(addr: &str, store: SharedStore, read_timeout: Duration) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| VolumeterError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        tracing::info!(%addr, "control listener bound");
        Ok(Self {
            listener,
            store,
            read_timeout,
        })
    }

    /// Returns the bound socket address (useful when binding port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be determined.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| VolumeterError::io("resolving control listener address", e))
    }

    /// Accept loop. Each connection is served to completion by its own
    /// task, so a slow controller never blocks the next accept or the
    /// ingest path. Runs until the task is dropped.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let store = self.store.clone();
                    let read_timeout = self.read_timeout;
                    drop(tokio::spawn(async move {
                        if let Err(error) = serve_connection(stream, store, read_timeout).await {
                            tracing::debug!(%peer, %error, "control connection ended early");
                        }
                    }));
                }
                Err(error) => {
                    // Transient accept failures (e.g. fd exhaustion) should
                    // not take the listener down.
                    tracing::warn!(%error, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

/// Computes the response for one command against the store.
///
/// # Errors
///
/// Returns an error if a snapshot cannot be serialized.
pub async fn respond(store: &SharedStore, command: Command) -> Result<String> {
    match command {
        Command::GetData => store.snapshot().await.to_json(),
        Command::GetDataAndReset => store.snapshot_and_reset().await.to_json(),
        Command::Reset => {
            store.reset().await;
            tracing::info!("counters reset by controller");
            Ok(RESET_ACK.to_string())
        }
        Command::Unknown => Ok(UNKNOWN_COMMAND.to_string()),
    }
}

async fn serve_connection(
    stream: TcpStream,
    store: SharedStore,
    read_timeout: Duration,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    let read = tokio::time::timeout(read_timeout, reader.read_line(&mut line))
        .await
        .map_err(|_| {
            VolumeterError::io(
                "waiting for control command",
                std::io::Error::from(std::io::ErrorKind::TimedOut),
            )
        })?
        .map_err(|e| VolumeterError::io("reading control command", e))?;
    if read == 0 {
        // Client connected and went away without a command.
        return Ok(());
    }

    let command = Command::parse(&line);
    tracing::debug!(?command, "control command received");
    let response = respond(&store, command).await?;

    write_half
        .write_all(response.as_bytes())
        .await
        .map_err(|e| VolumeterError::io("writing control response", e))?;
    write_half
        .shutdown()
        .await
        .map_err(|e| VolumeterError::io("closing control connection", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use volumeter_common::types::{Event, EventKind, Protocol};

    #[test]
    fn command_parsing_is_case_insensitive() {
        assert_eq!(Command::parse("GET_DATA"), Command::GetData);
        assert_eq!(Command::parse("get_data"), Command::GetData);
        assert_eq!(Command::parse("Reset"), Command::Reset);
        assert_eq!(Command::parse("GET_DATA_AND_RESET\n"), Command::GetDataAndReset);
    }

    #[test]
    fn unrecognized_commands_map_to_unknown() {
        assert_eq!(Command::parse("FOO"), Command::Unknown);
        assert_eq!(Command::parse(""), Command::Unknown);
        assert_eq!(Command::parse("get data"), Command::Unknown);
    }

    fn destroy_event(port: u16) -> Event {
        Event {
            timestamp: "0.0".into(),
            kind: EventKind::Destroy {
                packets: 2,
                bytes: 120,
            },
            protocol: Protocol::Tcp,
            dst_addr: "147.32.83.179".into(),
            dst_port: port,
            replied: true,
        }
    }

    #[tokio::test]
    async fn unknown_command_leaves_store_unchanged() {
        let store = SharedStore::new();
        store.apply(&destroy_event(80)).await;
        let before = store.snapshot().await;

        let response = respond(&store, Command::Unknown).await.expect("responds");
        assert_eq!(response, UNKNOWN_COMMAND);
        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn reset_answers_with_acknowledgement_and_clears() {
        let store = SharedStore::new();
        store.apply(&destroy_event(80)).await;

        let response = respond(&store, Command::Reset).await.expect("responds");
        assert_eq!(response, RESET_ACK);
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn get_data_and_reset_answers_with_pre_reset_snapshot() {
        let store = SharedStore::new();
        store.apply(&destroy_event(443)).await;

        let response = respond(&store, Command::GetDataAndReset)
            .await
            .expect("responds");
        let value: serde_json::Value = serde_json::from_str(&response).expect("valid JSON");
        assert_eq!(value["tcp"]["443"]["packets"], 2);
        assert!(store.snapshot().await.is_empty());
    }
}
