//! Per-port traffic accumulation.
//!
//! [`AggregationStore`] is the single piece of mutable state in the daemon:
//! a lazy map from `(protocol, port)` to cumulative volumes. It is purely
//! synchronous; [`SharedStore`] wraps it in one async mutex, which is the
//! entire concurrency discipline between the ingest loop and the control
//! server. `snapshot_and_reset` runs both halves inside a single critical
//! section, so no event application can fall between the read and the clear.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use volumeter_common::error::Result;
use volumeter_common::types::{Event, EventKind, PortKey, PortVolume, Protocol};

/// Mapping from `(protocol, port)` to accumulated volume.
///
/// Keys are inserted on first observation and only removed wholesale by
/// [`reset`](Self::reset).
#[derive(Debug, Default)]
pub struct AggregationStore {
    counters: BTreeMap<PortKey, PortVolume>,
}

impl AggregationStore {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counters: BTreeMap::new(),
        }
    }

    /// Applies one parsed event to its counter.
    ///
    /// Destroy events fold their final volumes into the cumulative totals
    /// and zero the provisional buffer; active events bump the buffer by
    /// one estimated packet. The buffer never contributes to the totals.
    pub fn apply(&mut self, event: &Event) {
        let key = event.key();
        let counter = self.counters.entry(key).or_default();
        match event.kind {
            EventKind::Destroy { packets, bytes } => {
                counter.packets = counter.packets.saturating_add(packets);
                counter.bytes = counter.bytes.saturating_add(bytes);
                counter.buffer = 0;
                tracing::debug!(
                    timestamp = %event.timestamp,
                    %key,
                    packets = counter.packets,
                    bytes = counter.bytes,
                    "connection destroyed"
                );
            }
            EventKind::Active => {
                counter.buffer = counter.buffer.saturating_add(1);
                tracing::trace!(timestamp = %event.timestamp, %key, "active connection estimated");
            }
        }
    }

    /// Returns a point-in-time copy of all counters without mutating state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let mut protocols: BTreeMap<Protocol, BTreeMap<u16, PortVolume>> = BTreeMap::new();
        for (key, volume) in &self.counters {
            let _ = protocols
                .entry(key.protocol)
                .or_default()
                .insert(key.port, *volume);
        }
        Snapshot(protocols)
    }

    /// Discards all counters, returning the store to its initial empty
    /// state. Idempotent.
    pub fn reset(&mut self) {
        self.counters.clear();
    }

    /// Takes a snapshot and then resets, as one indivisible operation with
    /// respect to `&mut self`.
    #[must_use]
    pub fn snapshot_and_reset(&mut self) -> Snapshot {
        let snapshot = self.snapshot();
        self.reset();
        snapshot
    }

    /// Number of distinct `(protocol, port)` keys observed since the last
    /// reset.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether the store holds no counters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

/// A consistent point-in-time view of every counter, grouped per protocol
/// and keyed by port. Serializes to a field-named JSON object, e.g.
/// `{"tcp":{"443":{"packets":15,"bytes":3000,"buffer":0}}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<Protocol, BTreeMap<u16, PortVolume>>);

impl Snapshot {
    /// Looks up the volume recorded for a protocol/port pair.
    #[must_use]
    pub fn get(&self, protocol: Protocol, port: u16) -> Option<&PortVolume> {
        self.0.get(&protocol).and_then(|ports| ports.get(&port))
    }

    /// Whether the snapshot contains no counters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total packets across all counters (cumulative only, buffers excluded).
    #[must_use]
    pub fn total_packets(&self) -> u64 {
        self.0
            .values()
            .flat_map(BTreeMap::values)
            .map(|v| v.packets)
            .sum()
    }

    /// Encodes the snapshot as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// The store behind its single lock, cloneable across tasks.
///
/// Every critical section is short (bounded by the number of observed
/// keys), so neither the ingest path nor a control connection can stall the
/// other for long.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<AggregationStore>>,
}

impl SharedStore {
    /// Creates a new empty shared store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event under the lock.
    pub async fn apply(&self, event: &Event) {
        self.inner.lock().await.apply(event);
    }

    /// Takes a consistent snapshot under the lock.
    pub async fn snapshot(&self) -> Snapshot {
        self.inner.lock().await.snapshot()
    }

    /// Clears all counters under the lock.
    pub async fn reset(&self) {
        self.inner.lock().await.reset();
    }

    /// Snapshots and clears atomically: the lock is held across both
    /// halves, so no concurrent apply lands in between.
    pub async fn snapshot_and_reset(&self) -> Snapshot {
        self.inner.lock().await.snapshot_and_reset()
    }
}
