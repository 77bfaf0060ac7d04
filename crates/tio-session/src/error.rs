//! The caller-facing error taxonomy (§7, §10.1).

use thiserror::Error;
use tio_proto::RpcErrorCode;

/// Errors a [`crate::session::Session`] can return to a caller.
///
/// Per §7: `Transport` is fatal to the session and fails every in-flight
/// RPC; `Framing`/`Protocol`/`State` are normally downgraded to a logged
/// warning and the packet dropped, surfacing here only from the handshake
/// path (§4.4 `Connecting`/`Handshake`), where a malformed reply means the
/// session never got off the ground; `RpcTimeout` and `RpcError` are
/// reported to the caller without taking the session down; `Cache` wraps
/// persistent state cache I/O (§6, §11.4).
#[derive(Error, Debug)]
pub enum SessionError {
    /// The transport was lost: socket closed, serial device unplugged, a
    /// read/write syscall failed. Fatal — no reconnection (§1 Non-goals).
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A framing error surfaced from a context where it's fatal (the
    /// handshake path), rather than logged and dropped.
    #[error("framing error: {0}")]
    Framing(#[from] tio_proto::FramingError),

    /// A protocol error surfaced from a context where it's fatal (the
    /// handshake path).
    #[error("protocol error: {0}")]
    Protocol(#[from] tio_proto::ProtocolError),

    /// A protocol-state error (unresolved descriptor reference) surfaced
    /// from the handshake path.
    #[error("protocol state error: {0}")]
    State(#[from] tio_core::StateError),

    /// No reply arrived for an RPC within its deadline (§4.4: "≈3 s").
    #[error("RPC to {topic} timed out")]
    RpcTimeout {
        /// The RPC's topic/method name.
        topic: String,
    },

    /// The device replied with an `RPC_ERROR` record.
    #[error("RPC to {topic} failed: {code}")]
    RpcError {
        /// The RPC's topic/method name.
        topic: String,
        /// The device's reported error code.
        code: RpcErrorCode,
    },

    /// A URL failed to parse into a connect target (§6).
    #[error("invalid session URL {url:?}: {reason}")]
    InvalidUrl {
        /// The URL that failed to parse.
        url: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The persistent state cache failed to load or save.
    #[error("state cache error: {0}")]
    Cache(String),

    /// A source named in `stream_read_topic`/`source_active` isn't known
    /// to this session's metadata cache.
    #[error("unknown source topic {0:?}")]
    UnknownTopic(String),

    /// The session isn't done enumerating yet (§4.4 `State::Enumerating`)
    /// and the requested operation needs a compiled stream.
    #[error("session not yet running: {0}")]
    NotRunning(&'static str),
}
