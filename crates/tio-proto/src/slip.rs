//! Byte-stuffed framing for serial transports (§4.1).
//!
//! Each logical packet is CRC32-suffixed, then stuffed between `0xC0` frame
//! delimiters. `0xDB` escapes a literal `0xC0` or `0xDB` byte in the stuffed
//! body as `0xDB 0xDC` / `0xDB 0xDD`.

use crate::error::FramingError;

/// Frame delimiter.
pub const END: u8 = 0xC0;
/// Escape byte.
pub const ESC: u8 = 0xDB;
/// Escaped form of [`END`].
pub const ESC_END: u8 = 0xDC;
/// Escaped form of [`ESC`].
pub const ESC_ESC: u8 = 0xDD;

/// CRC32 trailer length, in bytes.
const CRC_LEN: usize = 4;

/// Append a little-endian CRC32 to `payload` and byte-stuff the result
/// between `0xC0` delimiters.
///
/// The returned buffer contains exactly two `0xC0` bytes: one leading, one
/// trailing (§8 property 1).
#[must_use]
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let crc = crc32fast::hash(payload).to_le_bytes();

    let mut out = Vec::with_capacity(payload.len() + CRC_LEN + 2);
    out.push(END);
    for &byte in payload.iter().chain(crc.iter()) {
        match byte {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            other => out.push(other),
        }
    }
    out.push(END);
    out
}

/// Undo [`encode`]: strip delimiters and escapes, verify the trailing CRC32,
/// and return the original payload.
///
/// `stuffed` may or may not include the leading/trailing `0xC0` delimiters;
/// both are accepted so callers that split on `0xC0` before calling this
/// (the common case for a restartable decoder) don't need to re-add them.
///
/// # Errors
///
/// - [`FramingError::ShorterThanCrc`] if the de-stuffed body is shorter than
///   the 4-byte CRC trailer.
/// - [`FramingError::InvalidEscape`] if `0xDB` is followed by anything other
///   than `0xDC`/`0xDD`.
/// - [`FramingError::CrcMismatch`] if the trailing CRC32 doesn't match.
pub fn decode(stuffed: &[u8]) -> Result<Vec<u8>, FramingError> {
    let body = stuffed.strip_prefix(&[END]).unwrap_or(stuffed);
    let body = body.strip_suffix(&[END]).unwrap_or(body);

    let mut unstuffed = Vec::with_capacity(body.len());
    let mut bytes = body.iter().copied();
    while let Some(byte) = bytes.next() {
        if byte == ESC {
            match bytes.next() {
                Some(ESC_END) => unstuffed.push(END),
                Some(ESC_ESC) => unstuffed.push(ESC),
                _ => return Err(FramingError::InvalidEscape),
            }
        } else if byte == END {
            // A bare delimiter inside the body means the frame was already
            // split here; ignore it rather than treating it as data.
        } else {
            unstuffed.push(byte);
        }
    }

    if unstuffed.len() < CRC_LEN {
        return Err(FramingError::ShorterThanCrc);
    }

    let split = unstuffed.len() - CRC_LEN;
    let (payload, crc_bytes) = unstuffed.split_at(split);
    let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let actual = crc32fast::hash(payload);
    if actual != expected {
        return Err(FramingError::CrcMismatch);
    }

    Ok(payload.to_vec())
}

/// Scan `buf` for a complete delimited frame starting at or after index 0.
///
/// Returns `(frame_including_delimiters, bytes_consumed)` for the first
/// complete `0xC0 ... 0xC0` run found, skipping any leading run of bare
/// `0xC0` bytes (idle-line keep-alives). Returns `None` if no complete frame
/// is present yet — the caller should keep accumulating bytes. This makes
/// the decoder restartable across partial reads: a caller folds incoming
/// bytes into a growing buffer and calls this repeatedly.
#[must_use]
pub fn next_frame(buf: &[u8]) -> Option<(&[u8], usize)> {
    let start = buf.iter().position(|&b| b != END)?;
    let start = start.saturating_sub(1).max(0);
    let start = buf[start..].iter().position(|&b| b == END).map(|p| p + start)?;
    let rest = &buf[start + 1..];
    let end_rel = rest.iter().position(|&b| b == END)?;
    let end = start + 1 + end_rel;
    Some((&buf[start..=end], end + 1))
}
