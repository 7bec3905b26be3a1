//! System-wide constants and protocol literals.

/// Default TCP port for the control protocol.
pub const DEFAULT_CONTROL_PORT: u16 = 53333;

/// Default bind address for the control listener.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";

/// Sentinel port under which ICMP traffic is accumulated (ICMP carries no
/// destination port; 0 is never a valid conntrack `dport`).
pub const ICMP_SENTINEL_PORT: u16 = 0;

/// Acknowledgement literal returned for a successful `RESET` command.
pub const RESET_ACK: &str = "reset_done";

/// Literal returned for any unrecognized control command.
pub const UNKNOWN_COMMAND: &str = "unknown_command";

/// Default command line used to spawn the conntrack event source.
pub const CONNTRACK_COMMAND: &str = "conntrack";

/// Default arguments for the conntrack event source: follow events forever,
/// prefix each line with a timestamp.
pub const CONNTRACK_ARGS: &[&str] = &["-E", "-o", "timestamp"];

/// Default per-connection read timeout for the control server, in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 5;

/// Capacity of the line channel between the source reader and the ingest
/// loop. Bounded so a stalled ingest path applies backpressure to the
/// reader instead of growing without limit.
pub const LINE_CHANNEL_CAPACITY: usize = 1024;

/// Application name used in CLI output and logging.
pub const APP_NAME: &str = "volumeter";
