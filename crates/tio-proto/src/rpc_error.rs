//! RPC error codes (§6).

/// An RPC error code as carried by an `RPC_ERROR` packet.
///
/// Codes 0-17 are reserved by the protocol; 18 and above are device-defined
/// ("user" codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorCode {
    /// No error (rarely sent as an error code in practice).
    None,
    /// The RPC mechanism itself failed in an unspecified way.
    Undefined,
    /// No RPC with that name/ordinal exists.
    NotFound,
    /// The request payload was malformed for the target RPC's type.
    Malformed,
    /// The argument payload had the wrong size for the target RPC's type.
    ArgsSize,
    /// The argument value was out of the RPC's accepted domain.
    Invalid,
    /// The RPC is read-only; a value was supplied for a call that takes none.
    ReadOnly,
    /// The RPC is write-only; it was called without a value.
    WriteOnly,
    /// The device-side handler itself timed out.
    Timeout,
    /// The device is busy and cannot service the call right now.
    Busy,
    /// The device is in a state that doesn't permit this call.
    State,
    /// Loading persisted configuration failed.
    Load,
    /// Loading the persisted RPC table failed.
    LoadRpc,
    /// Saving persisted configuration failed.
    Save,
    /// Saving persisted configuration failed while writing.
    SaveWrite,
    /// Internal device error.
    Internal,
    /// The device ran out of buffers to service the call.
    NoBufs,
    /// The argument value was out of range.
    Range,
    /// A device-defined error code (18 and above).
    User(u16),
}

impl RpcErrorCode {
    /// Decode the wire ordinal.
    #[must_use]
    pub fn from_u16(code: u16) -> Self {
        match code {
            0 => Self::None,
            1 => Self::Undefined,
            2 => Self::NotFound,
            3 => Self::Malformed,
            4 => Self::ArgsSize,
            5 => Self::Invalid,
            6 => Self::ReadOnly,
            7 => Self::WriteOnly,
            8 => Self::Timeout,
            9 => Self::Busy,
            10 => Self::State,
            11 => Self::Load,
            12 => Self::LoadRpc,
            13 => Self::Save,
            14 => Self::SaveWrite,
            15 => Self::Internal,
            16 => Self::NoBufs,
            17 => Self::Range,
            other => Self::User(other),
        }
    }

    /// Encode back to the wire ordinal.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Undefined => 1,
            Self::NotFound => 2,
            Self::Malformed => 3,
            Self::ArgsSize => 4,
            Self::Invalid => 5,
            Self::ReadOnly => 6,
            Self::WriteOnly => 7,
            Self::Timeout => 8,
            Self::Busy => 9,
            Self::State => 10,
            Self::Load => 11,
            Self::LoadRpc => 12,
            Self::Save => 13,
            Self::SaveWrite => 14,
            Self::Internal => 15,
            Self::NoBufs => 16,
            Self::Range => 17,
            Self::User(code) => code,
        }
    }
}

impl std::fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(code) => write!(f, "user error {code}"),
            other => write!(f, "{:?}", other),
        }
    }
}
