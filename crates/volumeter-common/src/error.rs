//! Unified error types for the Volumeter workspace.
//!
//! The engine defines a dedicated parse-error enum for per-line failures
//! (which are expected, logged, and discarded); everything that can abort a
//! component funnels through [`VolumeterError`].

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum VolumeterError {
    /// An I/O operation failed.
    #[error("I/O error while {context}: {source}")]
    Io {
        /// What the component was doing when the error occurred.
        context: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// The control listener could not be bound at startup.
    #[error("cannot bind control listener on {addr}: {source}")]
    Bind {
        /// Address the listener attempted to bind.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl VolumeterError {
    /// Wraps an I/O error with a description of the failed operation.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, VolumeterError>;
