//! Session configuration (§10.3).
//!
//! Programmatic only — no YAML/TOML surface (that's an out-of-scope external
//! collaborator). `Default` matches the literal constants named in §4.4 and
//! §6.

use std::time::Duration;

/// Serial-port parameters (§6: "Default serial parameters: 115200 8N1, 1 s
/// read timeout").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SerialConfig {
    /// Baud rate.
    pub baud_rate: u32,
    /// Per-read timeout; an unresponsive port beyond this fails the session.
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self { baud_rate: 115_200, read_timeout: Duration::from_secs(1) }
    }
}

/// Tunables for a [`crate::session::Session`] (§10.3).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// How long `rpc`/`rpc_typed` wait for a matching reply (§4.4: "≈3 s").
    pub rpc_timeout: Duration,
    /// Writer idle poll interval before it emits a heartbeat (§4.4: "≈0.5
    /// s").
    pub heartbeat_interval: Duration,
    /// `pub_queue` capacity (§4.4, §5).
    pub pub_queue_capacity: usize,
    /// `req_queue` capacity (§4.4, §5).
    pub req_queue_capacity: usize,
    /// `rep_queue` capacity (§4.4, §5).
    pub rep_queue_capacity: usize,
    /// Whether `Handshake` should consult/populate the persistent state
    /// cache (§4.4 step 2, §6).
    pub use_state_cache: bool,
    /// How many times `Enumerating` polls for stream descriptors before
    /// giving up and moving to `Running` anyway (§11.3).
    pub enumerate_poll_attempts: u32,
    /// Interval between those polls (§11.3: "0.5 s intervals").
    pub enumerate_poll_interval: Duration,
    /// Serial-transport parameters, used only when the connect target is a
    /// serial device.
    pub serial: SerialConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_secs(3),
            heartbeat_interval: Duration::from_millis(500),
            pub_queue_capacity: 1000,
            req_queue_capacity: 1,
            rep_queue_capacity: 1,
            use_state_cache: true,
            enumerate_poll_attempts: 8,
            enumerate_poll_interval: Duration::from_millis(500),
            serial: SerialConfig::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_constants() {
        let config = SessionConfig::default();
        assert_eq!(config.rpc_timeout, Duration::from_secs(3));
        assert_eq!(config.heartbeat_interval, Duration::from_millis(500));
        assert_eq!(config.pub_queue_capacity, 1000);
        assert_eq!(config.req_queue_capacity, 1);
        assert_eq!(config.rep_queue_capacity, 1);
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.read_timeout, Duration::from_secs(1));
        assert_eq!(config.enumerate_poll_attempts, 8);
    }
}
