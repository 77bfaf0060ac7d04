//! Protocol-state error taxonomy (§7: "decoded into the protocol state").

use thiserror::Error;
use tio_proto::ProtocolError;

/// Errors raised while folding a decoded packet into protocol state.
///
/// Per §7, these are logged and the offending packet is dropped; existing
/// state is preserved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A `SOURCE`/`STREAM` packet referenced a timebase that hasn't been
    /// seen yet (§4.3: "no-op if the referenced timebase/source is
    /// unknown").
    #[error("source/stream {kind} {id} references unknown timebase {timebase_id}")]
    UnknownTimebase {
        /// Which descriptor referenced the timebase.
        kind: &'static str,
        /// The descriptor's own id.
        id: u16,
        /// The missing timebase id.
        timebase_id: u16,
    },

    /// A `STREAM` packet's component referenced a source that hasn't been
    /// seen yet.
    #[error("stream component references unknown source {source_id}")]
    UnknownSource {
        /// The missing source id.
        source_id: u16,
    },

    /// A `STREAM0` sample's row length didn't match any compiled schema.
    #[error("no compiled schema for a {row_len}-byte row")]
    UnknownRowSchema {
        /// The row length that had no match.
        row_len: usize,
    },

    /// The wire-level packet decode failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
