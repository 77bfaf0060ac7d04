//! The fixed 4-byte packet header shared by every transport.
//!
//! `payload_type: u8 | routing_size: u8 | payload_size: u16 (little-endian)`.
//! Multi-byte fields are stored as raw byte arrays and exposed through typed
//! accessor/mutator pairs that do the endian conversion explicitly, so the
//! struct's on-wire layout never depends on host endianness.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::FramingError;

/// Size of the fixed header, in bytes.
pub const HEADER_SIZE: usize = 4;

/// Largest payload a packet may carry (§6).
pub const MAX_PAYLOAD_SIZE: u16 = 512;

/// Largest routing prefix a packet may carry (§6).
pub const MAX_ROUTING_SIZE: u8 = 8;

/// The fixed 4-byte packet header.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct PacketHeader {
    payload_type: u8,
    routing_size: u8,
    payload_size: [u8; 2],
}

impl PacketHeader {
    /// Build a header for a packet carrying `payload_size` payload bytes and
    /// `routing_size` routing bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::PayloadTooLarge`] or
    /// [`FramingError::RoutingTooLarge`] if either exceeds its cap.
    pub fn new(payload_type: u8, routing_size: u8, payload_size: u16) -> Result<Self, FramingError> {
        if payload_size > MAX_PAYLOAD_SIZE {
            return Err(FramingError::PayloadTooLarge(payload_size));
        }
        if routing_size > MAX_ROUTING_SIZE {
            return Err(FramingError::RoutingTooLarge(routing_size));
        }
        Ok(Self { payload_type, routing_size, payload_size: payload_size.to_le_bytes() })
    }

    /// Parse a header from exactly [`HEADER_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::Truncated`] if `bytes` is shorter than
    /// [`HEADER_SIZE`], or a size-bound error per [`PacketHeader::new`]'s
    /// rules (checked after parsing, so bound violations never read past the
    /// header itself — §8 property 3).
    pub fn parse(bytes: &[u8]) -> Result<Self, FramingError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FramingError::Truncated);
        }
        let header = Self::ref_from_bytes(&bytes[..HEADER_SIZE])
            .map_err(|_| FramingError::Truncated)?;
        if header.payload_size() > MAX_PAYLOAD_SIZE {
            return Err(FramingError::PayloadTooLarge(header.payload_size()));
        }
        if header.routing_size > MAX_ROUTING_SIZE {
            return Err(FramingError::RoutingTooLarge(header.routing_size));
        }
        Ok(*header)
    }

    /// Serialize to exactly [`HEADER_SIZE`] bytes.
    #[must_use]
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// The packet-type tag (§4.2).
    #[must_use]
    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    /// Length of the trailing routing prefix, in bytes.
    #[must_use]
    pub fn routing_size(&self) -> u8 {
        self.routing_size
    }

    /// Length of the payload, in bytes (excludes header and routing bytes).
    #[must_use]
    pub fn payload_size(&self) -> u16 {
        u16::from_le_bytes(self.payload_size)
    }

    /// Total on-wire length of header + payload + routing.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_size() as usize + self.routing_size as usize
    }
}

impl std::fmt::Debug for PacketHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketHeader")
            .field("payload_type", &self.payload_type)
            .field("routing_size", &self.routing_size)
            .field("payload_size", &self.payload_size())
            .finish()
    }
}

impl PartialEq for PacketHeader {
    fn eq(&self, other: &Self) -> bool {
        self.payload_type == other.payload_type
            && self.routing_size == other.routing_size
            && self.payload_size == other.payload_size
    }
}

impl Eq for PacketHeader {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn header_size_is_four_bytes() {
        assert_eq!(HEADER_SIZE, 4);
        assert_eq!(std::mem::size_of::<PacketHeader>(), 4);
    }

    #[test]
    fn round_trip() {
        let header = PacketHeader::new(8, 2, 300).unwrap();
        let bytes = header.to_bytes();
        let parsed = PacketHeader::parse(&bytes).unwrap();
        assert_eq!(header, parsed);
        assert_eq!(parsed.payload_type(), 8);
        assert_eq!(parsed.routing_size(), 2);
        assert_eq!(parsed.payload_size(), 300);
    }

    #[test]
    fn little_endian_payload_size() {
        let header = PacketHeader::new(1, 0, 0x0201).unwrap();
        let bytes = header.to_bytes();
        assert_eq!(bytes, [1, 0, 0x01, 0x02]);
    }

    #[test]
    fn reject_truncated_header() {
        assert!(matches!(PacketHeader::parse(&[1, 2, 3]), Err(FramingError::Truncated)));
    }

    #[test]
    fn reject_oversized_payload() {
        assert!(matches!(
            PacketHeader::new(1, 0, MAX_PAYLOAD_SIZE + 1),
            Err(FramingError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn reject_oversized_routing() {
        assert!(matches!(
            PacketHeader::new(1, MAX_ROUTING_SIZE + 1, 0),
            Err(FramingError::RoutingTooLarge(_))
        ));
    }

    #[test]
    fn frame_len_accounts_for_payload_and_routing() {
        let header = PacketHeader::new(8, 3, 10).unwrap();
        assert_eq!(header.frame_len(), HEADER_SIZE + 10 + 3);
    }
}
