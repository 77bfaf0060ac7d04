//! Typed value marshaling (§4.2, §9 "Dynamic typing of RPC values").
//!
//! The wire carries a type tag alongside RPC arguments/replies and source
//! descriptors. This module is the tagged-union replacement for that
//! dynamic typing: [`TypeTag`] names the wire representation, [`Value`]
//! carries a decoded instance, and each converts to/from raw bytes.

use crate::error::ProtocolError;

/// A wire type tag. 24-bit variants are reserved but unimplemented (§9 open
/// question) and are rejected by [`TypeTag::from_u8`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum TypeTag {
    /// No value / empty.
    None = 0x00,
    /// Opaque/UTF-8 string (length given by the surrounding record, not the
    /// tag).
    Str = 0x03,
    /// Unsigned 8-bit integer.
    U8 = 0x10,
    /// Signed 8-bit integer.
    I8 = 0x11,
    /// Unsigned 16-bit integer.
    U16 = 0x20,
    /// Signed 16-bit integer.
    I16 = 0x21,
    /// Unsigned 32-bit integer.
    U32 = 0x40,
    /// Signed 32-bit integer.
    I32 = 0x41,
    /// IEEE-754 32-bit float.
    F32 = 0x42,
    /// Unsigned 64-bit integer.
    U64 = 0x80,
    /// Signed 64-bit integer.
    I64 = 0x81,
    /// IEEE-754 64-bit float.
    F64 = 0x82,
}

impl TypeTag {
    /// Byte size of a fixed-width value of this type. `None` for [`TypeTag::Str`]
    /// and [`TypeTag::None`], whose size depends on context.
    #[must_use]
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            TypeTag::None | TypeTag::Str => None,
            TypeTag::U8 | TypeTag::I8 => Some(1),
            TypeTag::U16 | TypeTag::I16 => Some(2),
            TypeTag::U32 | TypeTag::I32 | TypeTag::F32 => Some(4),
            TypeTag::U64 | TypeTag::I64 | TypeTag::F64 => Some(8),
        }
    }

    /// Parse a tag byte.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownTypeTag`] for reserved (24-bit) or
    /// unrecognized tags.
    pub fn from_u8(tag: u8) -> Result<Self, ProtocolError> {
        match tag {
            0x00 => Ok(TypeTag::None),
            0x03 => Ok(TypeTag::Str),
            0x10 => Ok(TypeTag::U8),
            0x11 => Ok(TypeTag::I8),
            0x20 => Ok(TypeTag::U16),
            0x21 => Ok(TypeTag::I16),
            0x40 => Ok(TypeTag::U32),
            0x41 => Ok(TypeTag::I32),
            0x42 => Ok(TypeTag::F32),
            0x80 => Ok(TypeTag::U64),
            0x81 => Ok(TypeTag::I64),
            0x82 => Ok(TypeTag::F64),
            other => Err(ProtocolError::UnknownTypeTag(other)),
        }
    }
}

/// A decoded typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Empty / no value.
    None,
    /// `u8`.
    U8(u8),
    /// `i8`.
    I8(i8),
    /// `u16`.
    U16(u16),
    /// `i16`.
    I16(i16),
    /// `u32`.
    U32(u32),
    /// `i32`.
    I32(i32),
    /// `u64`.
    U64(u64),
    /// `i64`.
    I64(i64),
    /// `f32`.
    F32(f32),
    /// `f64`.
    F64(f64),
    /// UTF-8 string.
    Str(String),
}

impl Value {
    /// The tag this value would encode as.
    #[must_use]
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::None => TypeTag::None,
            Value::U8(_) => TypeTag::U8,
            Value::I8(_) => TypeTag::I8,
            Value::U16(_) => TypeTag::U16,
            Value::I16(_) => TypeTag::I16,
            Value::U32(_) => TypeTag::U32,
            Value::I32(_) => TypeTag::I32,
            Value::U64(_) => TypeTag::U64,
            Value::I64(_) => TypeTag::I64,
            Value::F32(_) => TypeTag::F32,
            Value::F64(_) => TypeTag::F64,
            Value::Str(_) => TypeTag::Str,
        }
    }

    /// Little-endian wire encoding of this value.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Value::None => Vec::new(),
            Value::U8(v) => vec![*v],
            Value::I8(v) => vec![v.to_le_bytes()[0]],
            Value::U16(v) => v.to_le_bytes().to_vec(),
            Value::I16(v) => v.to_le_bytes().to_vec(),
            Value::U32(v) => v.to_le_bytes().to_vec(),
            Value::I32(v) => v.to_le_bytes().to_vec(),
            Value::U64(v) => v.to_le_bytes().to_vec(),
            Value::I64(v) => v.to_le_bytes().to_vec(),
            Value::F32(v) => v.to_le_bytes().to_vec(),
            Value::F64(v) => v.to_le_bytes().to_vec(),
            Value::Str(s) => s.as_bytes().to_vec(),
        }
    }

    /// Decode a value of `tag` from `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooShort`] if `bytes` is shorter than
    /// the tag's fixed size, or [`ProtocolError::InvalidUtf8`] for a
    /// malformed [`TypeTag::Str`].
    pub fn from_bytes(tag: TypeTag, bytes: &[u8]) -> Result<Self, ProtocolError> {
        fn need<const N: usize>(bytes: &[u8], record: &'static str) -> Result<[u8; N], ProtocolError> {
            bytes.get(..N).and_then(|s| s.try_into().ok()).ok_or(ProtocolError::PayloadTooShort {
                record,
                needed: N,
                got: bytes.len(),
            })
        }

        Ok(match tag {
            TypeTag::None => Value::None,
            TypeTag::U8 => Value::U8(need::<1>(bytes, "u8")?[0]),
            TypeTag::I8 => Value::I8(need::<1>(bytes, "i8")?[0] as i8),
            TypeTag::U16 => Value::U16(u16::from_le_bytes(need(bytes, "u16")?)),
            TypeTag::I16 => Value::I16(i16::from_le_bytes(need(bytes, "i16")?)),
            TypeTag::U32 => Value::U32(u32::from_le_bytes(need(bytes, "u32")?)),
            TypeTag::I32 => Value::I32(i32::from_le_bytes(need(bytes, "i32")?)),
            TypeTag::U64 => Value::U64(u64::from_le_bytes(need(bytes, "u64")?)),
            TypeTag::I64 => Value::I64(i64::from_le_bytes(need(bytes, "i64")?)),
            TypeTag::F32 => Value::F32(f32::from_le_bytes(need(bytes, "f32")?)),
            TypeTag::F64 => Value::F64(f64::from_le_bytes(need(bytes, "f64")?)),
            TypeTag::Str => Value::Str(
                String::from_utf8(bytes.to_vec())
                    .map_err(|_| ProtocolError::InvalidUtf8 { field: "value" })?,
            ),
        })
    }

    /// View as `f64`, widening integer/float variants; `None` for
    /// [`Value::None`] and [`Value::Str`].
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::U8(v) => Some(v.into()),
            Value::I8(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::I16(v) => Some(v.into()),
            Value::U32(v) => Some(v.into()),
            Value::I32(v) => Some(v.into()),
            Value::U64(v) => Some(v as f64),
            Value::I64(v) => Some(v as f64),
            Value::F32(v) => Some(v.into()),
            Value::F64(v) => Some(v),
            Value::None | Value::Str(_) => None,
        }
    }
}
