//! Session state machine, transports, and RPC layer for TIO clients.
//!
//! Sits above `tio-core`'s protocol state and `tio-proto`'s wire codec: this
//! is the crate a caller actually opens a device connection through.
//!
//! - [`session`] — the [`Session`] state machine, its reader/writer tasks,
//!   and the public `rpc`/`stream_read`/... API (§4.4).
//! - [`transport`] — bridges a session's channels to real TCP/UDP/serial I/O
//!   (§4.1, §6).
//! - [`url`] — parses `tcp://`/`udp://`/`router://interthread/`/serial
//!   connect-target strings (§6).
//! - [`config`] — [`SessionConfig`] tunables, defaulting to the literal
//!   constants named throughout §4.4 and §6.
//! - [`cache`] — the persistent per-device metadata cache (§6, §11.4).
//! - [`queue`] — the bounded drop-oldest queue backing `pub_queue` (§5).
//! - [`error`] — the caller-facing [`SessionError`] taxonomy (§7).

pub mod cache;
pub mod config;
pub mod error;
pub mod queue;
pub mod session;
pub mod transport;
pub mod url;

pub use config::{SerialConfig, SessionConfig};
pub use error::SessionError;
pub use session::{Session, State};
pub use transport::Connection;
pub use url::ConnectTarget;
