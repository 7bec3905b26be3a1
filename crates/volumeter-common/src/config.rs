//! Service configuration model.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VolumeterError};

/// Immutable configuration for a Volumeter instance, fixed at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeterConfig {
    /// Destination address whose traffic is accounted; events addressed
    /// elsewhere are dropped before they reach the store.
    pub monitored_addr: String,
    /// Address the control listener binds to.
    pub bind_addr: IpAddr,
    /// Port the control listener binds to.
    pub control_port: u16,
    /// Per-connection read timeout for the control server, in seconds.
    pub read_timeout_secs: u64,
}

impl VolumeterConfig {
    /// Builds a configuration for the given monitored address with default
    /// control-listener settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the monitored address is empty.
    pub fn new(monitored_addr: impl Into<String>) -> Result<Self> {
        let monitored_addr = monitored_addr.into();
        if monitored_addr.is_empty() {
            return Err(VolumeterError::Config {
                message: "monitored address must not be empty".into(),
            });
        }
        Ok(Self {
            monitored_addr,
            bind_addr: default_bind_addr(),
            control_port: crate::constants::DEFAULT_CONTROL_PORT,
            read_timeout_secs: crate::constants::DEFAULT_READ_TIMEOUT_SECS,
        })
    }

    /// Returns the socket address string for the control listener.
    #[must_use]
    pub fn control_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.control_port)
    }

    /// Returns the control-server read timeout as a [`Duration`].
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

fn default_bind_addr() -> IpAddr {
    // DEFAULT_BIND_ADDR is a literal loopback address; parsing it cannot fail.
    crate::constants::DEFAULT_BIND_ADDR
        .parse()
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}
