//! # volumeter-engine
//!
//! Core of the Volumeter daemon: parses conntrack lifecycle event lines,
//! accumulates per-port traffic volumes, and serves snapshot/reset commands
//! over a small line-oriented TCP control protocol.
//!
//! The pipeline is `source line -> parser -> event -> store`, driven by the
//! [`ingest`] loop; the [`server`] reads and resets the same [`store`]
//! through a single shared lock.

pub mod ingest;
pub mod parser;
pub mod server;
pub mod store;
