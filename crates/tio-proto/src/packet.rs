//! Packet-type tags, the raw on-wire packet shape, and decoded payload
//! records (§4.2, §6).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    error::{FramingError, ProtocolError},
    header::{HEADER_SIZE, PacketHeader},
};

/// A packet-type tag (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// UTF-8 log message.
    Log = 1,
    /// RPC request.
    RpcReq = 2,
    /// RPC reply.
    RpcRep = 3,
    /// RPC error reply.
    RpcError = 4,
    /// Keep-alive.
    Heartbeat = 5,
    /// Timebase descriptor.
    Timebase = 6,
    /// Source descriptor.
    Source = 7,
    /// Stream descriptor.
    Stream = 8,
    /// Stream-0 sample row.
    Stream0 = 128,
}

impl PacketType {
    /// Parse a wire tag.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownPacketType`] for any tag not listed
    /// in §4.2.
    pub fn from_u8(tag: u8) -> Result<Self, ProtocolError> {
        match tag {
            1 => Ok(Self::Log),
            2 => Ok(Self::RpcReq),
            3 => Ok(Self::RpcRep),
            4 => Ok(Self::RpcError),
            5 => Ok(Self::Heartbeat),
            6 => Ok(Self::Timebase),
            7 => Ok(Self::Source),
            8 => Ok(Self::Stream),
            128 => Ok(Self::Stream0),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }

    /// The wire tag byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// A structurally-decoded packet: header, routing bytes, and raw (still
/// type-tagged but un-interpreted) payload bytes.
///
/// This is the unit the framing codec and both transport flavors produce.
/// [`Payload::decode`] interprets `payload` according to `header`'s
/// `payload_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    /// The fixed header.
    pub header: PacketHeader,
    /// The packet's routing prefix, LSB-first along the path (§4.5).
    pub routing: Bytes,
    /// The raw payload bytes (excludes header and routing).
    pub payload: Bytes,
}

impl RawPacket {
    /// Build a raw packet, computing the header from the given parts.
    ///
    /// # Errors
    ///
    /// Propagates [`PacketHeader::new`]'s size-bound errors.
    pub fn new(payload_type: u8, routing: Bytes, payload: Bytes) -> Result<Self, FramingError> {
        let header = PacketHeader::new(
            payload_type,
            u8::try_from(routing.len()).map_err(|_| FramingError::RoutingTooLarge(u8::MAX))?,
            u16::try_from(payload.len()).map_err(|_| FramingError::PayloadTooLarge(u16::MAX))?,
        )?;
        Ok(Self { header, routing, payload })
    }

    /// Decode a raw packet from a buffer containing at least one complete
    /// `header | payload | routing` run (the TCP/UDP wire shape — §6).
    ///
    /// Returns the packet and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// [`FramingError::Truncated`] if fewer bytes are available than the
    /// header declares.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), FramingError> {
        let header = PacketHeader::parse(buf)?;
        let total = header.frame_len();
        if buf.len() < total {
            return Err(FramingError::Truncated);
        }
        let payload_end = HEADER_SIZE + header.payload_size() as usize;
        let payload = Bytes::copy_from_slice(&buf[HEADER_SIZE..payload_end]);
        let routing = Bytes::copy_from_slice(&buf[payload_end..total]);
        Ok((Self { header, routing, payload }, total))
    }

    /// Serialize to the TCP/UDP wire shape: `header | payload | routing`.
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(self.header.frame_len());
        out.put_slice(&self.header.to_bytes());
        out.put_slice(&self.payload);
        out.put_slice(&self.routing);
        out
    }

    /// The logical `header | payload | routing` frame body for the serial
    /// (SLIP) transport. `slip::encode` appends the trailing CRC32 and
    /// byte-stuffs the result into the `0xC0`-delimited
    /// `header | payload | routing | crc` wire frame.
    #[must_use]
    pub fn to_slip_payload(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(self.header.frame_len());
        out.put_slice(&self.header.to_bytes());
        out.put_slice(&self.payload);
        out.put_slice(&self.routing);
        out
    }
}

/// A timebase descriptor (§3, §6 — `H B B Q L L L f 16B`, 44 bytes).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timebase {
    /// Identity.
    pub timebase_id: u16,
    /// Epoch tag (meaning is device-defined; 0 is typically "since boot").
    pub epoch: u8,
    /// Reserved flags byte.
    pub flags: u8,
    /// Start time, in nanoseconds since `epoch`.
    pub start_time_ns: u64,
    /// Period numerator, microseconds.
    pub period_num_us: u32,
    /// Period denominator, microseconds.
    pub period_denom_us: u32,
    /// Reserved (present on the wire, not otherwise interpreted).
    pub reserved: u32,
    /// Stability, parts per billion.
    pub stability_ppb: f32,
}

const TIMEBASE_LEN: usize = 44;

impl Timebase {
    /// Decode from a `TIMEBASE` packet's payload.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadTooShort`] if shorter than 44 bytes.
    pub fn decode(mut bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < TIMEBASE_LEN {
            return Err(ProtocolError::PayloadTooShort {
                record: "TIMEBASE",
                needed: TIMEBASE_LEN,
                got: bytes.len(),
            });
        }
        let timebase_id = bytes.get_u16_le();
        let epoch = bytes.get_u8();
        let flags = bytes.get_u8();
        let start_time_ns = bytes.get_u64_le();
        let period_num_us = bytes.get_u32_le();
        let period_denom_us = bytes.get_u32_le();
        let reserved = bytes.get_u32_le();
        let stability_ppb = bytes.get_f32_le();
        Ok(Self {
            timebase_id,
            epoch,
            flags,
            start_time_ns,
            period_num_us,
            period_denom_us,
            reserved,
            stability_ppb,
        })
    }

    /// Encode to a `TIMEBASE` packet's payload.
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(TIMEBASE_LEN);
        out.put_u16_le(self.timebase_id);
        out.put_u8(self.epoch);
        out.put_u8(self.flags);
        out.put_u64_le(self.start_time_ns);
        out.put_u32_le(self.period_num_us);
        out.put_u32_le(self.period_denom_us);
        out.put_u32_le(self.reserved);
        out.put_f32_le(self.stability_ppb);
        out.put_slice(&[0u8; 16]);
        out
    }

    /// Effective period in microseconds (`num / denom`).
    #[must_use]
    pub fn period_us(&self) -> f64 {
        if self.period_denom_us == 0 {
            0.0
        } else {
            f64::from(self.period_num_us) / f64::from(self.period_denom_us)
        }
    }
}

const SOURCE_PREFIX_LEN: usize = 21;

/// A source descriptor (§3, §6 — `H H L L I H H B` prefix + tab-separated
/// description tail).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Source {
    /// Identity.
    pub source_id: u16,
    /// Timebase this source's samples are reckoned against.
    pub timebase_id: u16,
    /// Period multiplier relative to the timebase.
    pub period: u32,
    /// Sample offset (phase), in samples.
    pub offset: u32,
    /// Reserved (present on the wire, not otherwise interpreted).
    pub reserved: u32,
    /// Per-channel element type tag.
    pub data_type: u16,
    /// Channel count.
    pub channels: u16,
    /// Reserved flags byte.
    pub flags: u8,
    /// Source name (used as the lookup key — §3).
    pub name: String,
    /// Per-channel column names, in order.
    pub column_names: Vec<String>,
    /// Human-readable title.
    pub title: String,
    /// Units string.
    pub units: String,
}

impl Source {
    /// Decode from a `SOURCE` packet's payload.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadTooShort`] if shorter than the fixed prefix,
    /// [`ProtocolError::InvalidUtf8`] if the description tail isn't UTF-8.
    pub fn decode(mut bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < SOURCE_PREFIX_LEN {
            return Err(ProtocolError::PayloadTooShort {
                record: "SOURCE",
                needed: SOURCE_PREFIX_LEN,
                got: bytes.len(),
            });
        }
        let source_id = bytes.get_u16_le();
        let timebase_id = bytes.get_u16_le();
        let period = bytes.get_u32_le();
        let offset = bytes.get_u32_le();
        let reserved = bytes.get_u32_le();
        let data_type = bytes.get_u16_le();
        let channels = bytes.get_u16_le();
        let flags = bytes.get_u8();

        let description = std::str::from_utf8(bytes)
            .map_err(|_| ProtocolError::InvalidUtf8 { field: "source description" })?;
        let mut fields = description.split('\t');
        let name = fields.next().unwrap_or_default().to_string();
        let column_names = fields
            .next()
            .unwrap_or_default()
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let title = fields.next().unwrap_or_default().to_string();
        let units = fields.next().unwrap_or_default().to_string();

        Ok(Self {
            source_id,
            timebase_id,
            period,
            offset,
            reserved,
            data_type,
            channels,
            flags,
            name,
            column_names,
            title,
            units,
        })
    }

    /// Encode to a `SOURCE` packet's payload.
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(SOURCE_PREFIX_LEN + 32);
        out.put_u16_le(self.source_id);
        out.put_u16_le(self.timebase_id);
        out.put_u32_le(self.period);
        out.put_u32_le(self.offset);
        out.put_u32_le(self.reserved);
        out.put_u16_le(self.data_type);
        out.put_u16_le(self.channels);
        out.put_u8(self.flags);
        out.put_slice(self.name.as_bytes());
        out.put_u8(b'\t');
        out.put_slice(self.column_names.join(",").as_bytes());
        out.put_u8(b'\t');
        out.put_slice(self.title.as_bytes());
        out.put_u8(b'\t');
        out.put_slice(self.units.as_bytes());
        out
    }
}

const STREAM_HEADER_LEN: usize = 24;
const STREAM_COMPONENT_LEN: usize = 12;

/// One component of a stream descriptor (§3, §6 — `H H L L`, 12 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamComponent {
    /// The source this component draws from.
    pub source_id: u16,
    /// Reserved.
    pub reserved: u16,
    /// Period multiplier relative to the stream's own period.
    pub period: u32,
    /// Offset within the row, in the source's own units (channels).
    pub offset: u32,
}

/// The stream descriptor (§3, §6 — `H H L L Q H H` header + N components).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stream {
    /// Always 0 (§3: "fixed: id = 0").
    pub stream_id: u16,
    /// Timebase this stream's sample counter is reckoned against.
    pub timebase_id: u16,
    /// Period multiplier relative to the timebase.
    pub period: u32,
    /// Reserved.
    pub reserved: u32,
    /// Sample-counter baseline at the time this descriptor was issued.
    pub sample_counter_baseline: u64,
    /// Component count (redundant with `components.len()`, carried for
    /// round-trip fidelity with devices that pad the array).
    pub component_count: u16,
    /// Reserved flags.
    pub flags: u16,
    /// The stream's components, in wire order (defines column assignment —
    /// §3).
    pub components: Vec<StreamComponent>,
}

impl Stream {
    /// Decode from a `STREAM` packet's payload.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadTooShort`] if shorter than the fixed header,
    /// [`ProtocolError::ComponentCountMismatch`] if the declared count
    /// doesn't fit the remaining bytes.
    pub fn decode(mut bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < STREAM_HEADER_LEN {
            return Err(ProtocolError::PayloadTooShort {
                record: "STREAM",
                needed: STREAM_HEADER_LEN,
                got: bytes.len(),
            });
        }
        let stream_id = bytes.get_u16_le();
        let timebase_id = bytes.get_u16_le();
        let period = bytes.get_u32_le();
        let reserved = bytes.get_u32_le();
        let sample_counter_baseline = bytes.get_u64_le();
        let component_count = bytes.get_u16_le();
        let flags = bytes.get_u16_le();

        let expected_tail = usize::from(component_count) * STREAM_COMPONENT_LEN;
        if bytes.len() < expected_tail {
            return Err(ProtocolError::ComponentCountMismatch {
                declared: component_count.into(),
                got: bytes.len(),
            });
        }

        let mut components = Vec::with_capacity(component_count.into());
        for _ in 0..component_count {
            let source_id = bytes.get_u16_le();
            let comp_reserved = bytes.get_u16_le();
            let comp_period = bytes.get_u32_le();
            let comp_offset = bytes.get_u32_le();
            components.push(StreamComponent {
                source_id,
                reserved: comp_reserved,
                period: comp_period,
                offset: comp_offset,
            });
        }

        Ok(Self {
            stream_id,
            timebase_id,
            period,
            reserved,
            sample_counter_baseline,
            component_count,
            flags,
            components,
        })
    }

    /// Encode to a `STREAM` packet's payload.
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut out =
            BytesMut::with_capacity(STREAM_HEADER_LEN + self.components.len() * STREAM_COMPONENT_LEN);
        out.put_u16_le(self.stream_id);
        out.put_u16_le(self.timebase_id);
        out.put_u32_le(self.period);
        out.put_u32_le(self.reserved);
        out.put_u64_le(self.sample_counter_baseline);
        #[allow(clippy::cast_possible_truncation)]
        out.put_u16_le(self.components.len() as u16);
        out.put_u16_le(self.flags);
        for component in &self.components {
            out.put_u16_le(component.source_id);
            out.put_u16_le(component.reserved);
            out.put_u32_le(component.period);
            out.put_u32_le(component.offset);
        }
        out
    }
}

/// An `RPC_REQ` record (§4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRequest {
    /// Correlates with the matching `RPC_REP`/`RPC_ERROR`.
    pub request_id: u16,
    /// Either a numeric ordinal or (if the high bit was set on the wire) a
    /// named method, captured in [`RpcMethod`].
    pub method: RpcMethod,
    /// Optional argument payload.
    pub args: Bytes,
}

/// How an RPC's target method is identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcMethod {
    /// A numeric ordinal (high bit of `method_id` clear).
    Ordinal(u16),
    /// A named method (high bit set; low 15 bits were the inline name's
    /// length).
    Named(String),
}

const HIGH_BIT: u16 = 0x8000;

impl RpcRequest {
    /// Decode from an `RPC_REQ` packet's payload.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadTooShort`] if the fixed prefix or inline name
    /// is missing, [`ProtocolError::InvalidUtf8`] if the inline name isn't
    /// UTF-8.
    pub fn decode(mut bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < 4 {
            return Err(ProtocolError::PayloadTooShort {
                record: "RPC_REQ",
                needed: 4,
                got: bytes.len(),
            });
        }
        let request_id = bytes.get_u16_le();
        let method_id = bytes.get_u16_le();

        let method = if method_id & HIGH_BIT != 0 {
            let name_len = usize::from(method_id & !HIGH_BIT);
            if bytes.len() < name_len {
                return Err(ProtocolError::PayloadTooShort {
                    record: "RPC_REQ method name",
                    needed: name_len,
                    got: bytes.len(),
                });
            }
            let name_bytes = bytes.copy_to_bytes(name_len);
            let name = String::from_utf8(name_bytes.to_vec())
                .map_err(|_| ProtocolError::InvalidUtf8 { field: "method name" })?;
            RpcMethod::Named(name)
        } else {
            RpcMethod::Ordinal(method_id)
        };

        Ok(Self { request_id, method, args: Bytes::copy_from_slice(bytes) })
    }

    /// Encode to an `RPC_REQ` packet's payload.
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(4 + self.args.len() + 16);
        out.put_u16_le(self.request_id);
        match &self.method {
            RpcMethod::Ordinal(id) => {
                out.put_u16_le(*id & !HIGH_BIT);
            },
            RpcMethod::Named(name) => {
                #[allow(clippy::cast_possible_truncation)]
                let method_id = HIGH_BIT | (name.len() as u16 & !HIGH_BIT);
                out.put_u16_le(method_id);
                out.put_slice(name.as_bytes());
            },
        }
        out.put_slice(&self.args);
        out
    }
}

/// An `RPC_REP` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcReply {
    /// The request this replies to.
    pub request_id: u16,
    /// Opaque reply payload.
    pub payload: Bytes,
}

impl RpcReply {
    /// Decode from an `RPC_REP` packet's payload.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadTooShort`] if shorter than the 2-byte prefix.
    pub fn decode(mut bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < 2 {
            return Err(ProtocolError::PayloadTooShort {
                record: "RPC_REP",
                needed: 2,
                got: bytes.len(),
            });
        }
        let request_id = bytes.get_u16_le();
        Ok(Self { request_id, payload: Bytes::copy_from_slice(bytes) })
    }

    /// Encode to an `RPC_REP` packet's payload.
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(2 + self.payload.len());
        out.put_u16_le(self.request_id);
        out.put_slice(&self.payload);
        out
    }
}

/// An `RPC_ERROR` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcErrorReply {
    /// The request this replies to.
    pub request_id: u16,
    /// The wire error-code ordinal (see [`crate::rpc_error::RpcErrorCode`]).
    pub error_code: u16,
    /// Optional diagnostic message.
    pub message: Bytes,
}

impl RpcErrorReply {
    /// Decode from an `RPC_ERROR` packet's payload.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadTooShort`] if shorter than the 4-byte prefix.
    pub fn decode(mut bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < 4 {
            return Err(ProtocolError::PayloadTooShort {
                record: "RPC_ERROR",
                needed: 4,
                got: bytes.len(),
            });
        }
        let request_id = bytes.get_u16_le();
        let error_code = bytes.get_u16_le();
        Ok(Self { request_id, error_code, message: Bytes::copy_from_slice(bytes) })
    }

    /// Encode to an `RPC_ERROR` packet's payload.
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(4 + self.message.len());
        out.put_u16_le(self.request_id);
        out.put_u16_le(self.error_code);
        out.put_slice(&self.message);
        out
    }
}

/// A `STREAM0` record: sample counter plus the packed row bytes (§4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream0 {
    /// The wrapping sample counter (§3: "monotonic modulo u32 wrap").
    pub sample_number: u32,
    /// The packed row bytes, interpreted by the compiled row schema.
    pub row: Bytes,
}

impl Stream0 {
    /// Decode from a `STREAM0` packet's payload.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadTooShort`] if shorter than the 4-byte prefix.
    pub fn decode(mut bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < 4 {
            return Err(ProtocolError::PayloadTooShort {
                record: "STREAM0",
                needed: 4,
                got: bytes.len(),
            });
        }
        let sample_number = bytes.get_u32_le();
        Ok(Self { sample_number, row: Bytes::copy_from_slice(bytes) })
    }

    /// Encode to a `STREAM0` packet's payload.
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(4 + self.row.len());
        out.put_u32_le(self.sample_number);
        out.put_slice(&self.row);
        out
    }
}

/// A decoded packet payload, tagged by [`PacketType`] (§4.2).
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// UTF-8 log message.
    Log(String),
    /// RPC request.
    RpcReq(RpcRequest),
    /// RPC reply.
    RpcRep(RpcReply),
    /// RPC error reply.
    RpcError(RpcErrorReply),
    /// Keep-alive; optional opaque session token.
    Heartbeat(Bytes),
    /// Timebase descriptor.
    Timebase(Timebase),
    /// Source descriptor.
    Source(Source),
    /// Stream descriptor.
    Stream(Stream),
    /// Stream-0 sample row.
    Stream0(Stream0),
}

impl Payload {
    /// Decode `bytes` as the payload of a packet tagged `kind`.
    ///
    /// # Errors
    ///
    /// Propagates each record type's decode errors.
    pub fn decode(kind: PacketType, bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(match kind {
            PacketType::Log => Payload::Log(
                std::str::from_utf8(bytes)
                    .map_err(|_| ProtocolError::InvalidUtf8 { field: "log message" })?
                    .to_string(),
            ),
            PacketType::RpcReq => Payload::RpcReq(RpcRequest::decode(bytes)?),
            PacketType::RpcRep => Payload::RpcRep(RpcReply::decode(bytes)?),
            PacketType::RpcError => Payload::RpcError(RpcErrorReply::decode(bytes)?),
            PacketType::Heartbeat => Payload::Heartbeat(Bytes::copy_from_slice(bytes)),
            PacketType::Timebase => Payload::Timebase(Timebase::decode(bytes)?),
            PacketType::Source => Payload::Source(Source::decode(bytes)?),
            PacketType::Stream => Payload::Stream(Stream::decode(bytes)?),
            PacketType::Stream0 => Payload::Stream0(Stream0::decode(bytes)?),
        })
    }

    /// This payload's packet-type tag.
    #[must_use]
    pub fn kind(&self) -> PacketType {
        match self {
            Payload::Log(_) => PacketType::Log,
            Payload::RpcReq(_) => PacketType::RpcReq,
            Payload::RpcRep(_) => PacketType::RpcRep,
            Payload::RpcError(_) => PacketType::RpcError,
            Payload::Heartbeat(_) => PacketType::Heartbeat,
            Payload::Timebase(_) => PacketType::Timebase,
            Payload::Source(_) => PacketType::Source,
            Payload::Stream(_) => PacketType::Stream,
            Payload::Stream0(_) => PacketType::Stream0,
        }
    }

    /// Encode to raw payload bytes.
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        match self {
            Payload::Log(msg) => BytesMut::from(msg.as_bytes()),
            Payload::RpcReq(req) => req.encode(),
            Payload::RpcRep(rep) => rep.encode(),
            Payload::RpcError(err) => err.encode(),
            Payload::Heartbeat(token) => BytesMut::from(&token[..]),
            Payload::Timebase(tb) => tb.encode(),
            Payload::Source(src) => src.encode(),
            Payload::Stream(stream) => stream.encode(),
            Payload::Stream0(sample) => sample.encode(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn scenario_a_named_rpc_request() {
        let req = RpcRequest {
            request_id: 0x1234,
            method: RpcMethod::Named("dev.desc".to_string()),
            args: Bytes::new(),
        };
        let bytes = req.encode();
        assert_eq!(&bytes[0..2], &0x1234u16.to_le_bytes());
        let method_id = u16::from_le_bytes([bytes[2], bytes[3]]);
        assert_eq!(method_id & HIGH_BIT, HIGH_BIT);
        let decoded = RpcRequest::decode(&bytes).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn scenario_c_timebase_source_stream_round_trip() {
        let timebase = Timebase {
            timebase_id: 0,
            epoch: 0,
            flags: 0,
            start_time_ns: 0,
            period_num_us: 1000,
            period_denom_us: 1,
            reserved: 0,
            stability_ppb: 0.0,
        };
        let encoded = timebase.encode();
        assert_eq!(encoded.len(), TIMEBASE_LEN);
        assert_eq!(Timebase::decode(&encoded).unwrap(), timebase);

        let source = Source {
            source_id: 0,
            timebase_id: 0,
            period: 1,
            offset: 0,
            reserved: 0,
            data_type: crate::types::TypeTag::F32 as u16,
            channels: 3,
            flags: 0,
            name: "vec".to_string(),
            column_names: vec![],
            title: String::new(),
            units: String::new(),
        };
        let encoded = source.encode();
        assert_eq!(Source::decode(&encoded).unwrap(), source);

        let stream = Stream {
            stream_id: 0,
            timebase_id: 0,
            period: 1,
            reserved: 0,
            sample_counter_baseline: 0,
            component_count: 1,
            flags: 0,
            components: vec![StreamComponent { source_id: 0, reserved: 0, period: 1, offset: 0 }],
        };
        let encoded = stream.encode();
        assert_eq!(Stream::decode(&encoded).unwrap(), stream);

        let row = Stream0 { sample_number: 0, row: Bytes::from_static(&[0u8; 12]) };
        let encoded = row.encode();
        assert_eq!(Stream0::decode(&encoded).unwrap(), row);
    }

    #[test]
    fn raw_packet_round_trip() {
        let packet =
            RawPacket::new(PacketType::Heartbeat.to_u8(), Bytes::from_static(&[1, 2]), Bytes::new())
                .unwrap();
        let encoded = packet.encode();
        let (decoded, consumed) = RawPacket::decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, packet);
    }

    #[test]
    fn stream_component_count_mismatch_is_rejected() {
        let mut bytes = BytesMut::new();
        bytes.put_u16_le(0);
        bytes.put_u16_le(0);
        bytes.put_u32_le(1);
        bytes.put_u32_le(0);
        bytes.put_u64_le(0);
        bytes.put_u16_le(5); // claims 5 components
        bytes.put_u16_le(0);
        // but no component bytes follow
        assert!(matches!(
            Stream::decode(&bytes),
            Err(ProtocolError::ComponentCountMismatch { declared: 5, .. })
        ));
    }
}
