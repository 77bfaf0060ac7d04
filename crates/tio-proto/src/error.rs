//! Wire-level error taxonomy (§7: Framing and Protocol).

use thiserror::Error;

/// Errors from the framing layer: truncated frames, oversized header fields,
/// and (on serial) byte-stuffing/CRC failures.
///
/// Per §7, framing errors are per-packet: the offending frame is dropped and
/// the stream resumes on the next delimiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Fewer bytes were available than a complete header or frame requires.
    #[error("truncated frame")]
    Truncated,

    /// `payload_size` exceeded [`crate::header::MAX_PAYLOAD_SIZE`].
    #[error("payload size {0} exceeds maximum")]
    PayloadTooLarge(u16),

    /// `routing_size` exceeded [`crate::header::MAX_ROUTING_SIZE`].
    #[error("routing size {0} exceeds maximum")]
    RoutingTooLarge(u8),

    /// A SLIP escape byte (`0xDB`) was followed by something other than
    /// `0xDC` or `0xDD`.
    #[error("invalid SLIP escape sequence")]
    InvalidEscape,

    /// The de-stuffed frame was shorter than the 4-byte trailing CRC it must
    /// carry.
    #[error("frame shorter than CRC trailer")]
    ShorterThanCrc,

    /// The trailing CRC32 did not match the de-stuffed payload.
    #[error("CRC32 mismatch")]
    CrcMismatch,
}

/// Errors from the packet codec: a structurally valid frame whose payload
/// doesn't match the shape its `payload_type` promises (§7: Protocol).
///
/// Per §7, protocol errors are logged and the offending packet is dropped;
/// session state is preserved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// `payload_type` is not one of the known packet-type tags.
    #[error("unknown packet type {0:#04x}")]
    UnknownPacketType(u8),

    /// The payload is too short for the fixed-width prefix its record type
    /// requires.
    #[error("payload too short for {record}: need {needed} bytes, have {got}")]
    PayloadTooShort {
        /// Name of the record type being decoded.
        record: &'static str,
        /// Minimum bytes required.
        needed: usize,
        /// Bytes actually available.
        got: usize,
    },

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 {
        /// Name of the field.
        field: &'static str,
    },

    /// A stream descriptor's component count didn't match its declared
    /// payload length.
    #[error("stream component count {declared} doesn't fit payload of {got} bytes")]
    ComponentCountMismatch {
        /// Components the header declares.
        declared: usize,
        /// Bytes actually present for the component array.
        got: usize,
    },

    /// A value's type tag is not one of the known tags (24-bit variants are
    /// reserved but unimplemented — §9 open question).
    #[error("unknown or unimplemented type tag {0:#04x}")]
    UnknownTypeTag(u8),
}
