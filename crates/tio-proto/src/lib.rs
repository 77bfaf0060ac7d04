//! Wire format for the TIO sensor-telemetry protocol.
//!
//! This crate is sans-io: it only turns bytes into typed packets and back.
//! It knows nothing about sockets, serial ports, or session state — that
//! lives in `tio-core` and `tio-session`.
//!
//! - [`header`] — the fixed 4-byte packet header shared by every transport.
//! - [`slip`] — SLIP byte-stuffing and CRC32 framing for serial transports.
//! - [`packet`] — packet-type tags and decoded payload records.
//! - [`types`] — the typed-value tagged union carried by RPCs and sources.
//! - [`rpc_error`] — RPC error-code ordinals.
//! - [`error`] — the framing/protocol error taxonomy.

pub mod error;
pub mod header;
pub mod packet;
pub mod rpc_error;
pub mod slip;
pub mod types;

pub use error::{FramingError, ProtocolError};
pub use header::PacketHeader;
pub use packet::{
    Payload, PacketType, RawPacket, RpcErrorReply, RpcMethod, RpcReply, RpcRequest, Source, Stream,
    Stream0, StreamComponent, Timebase,
};
pub use rpc_error::RpcErrorCode;
pub use types::{TypeTag, Value};
