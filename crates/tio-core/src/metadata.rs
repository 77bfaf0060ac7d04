//! The device metadata cache: timebases, sources, the stream descriptor,
//! and the RPC table (§3, §4.3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tio_proto::{Source, Stream, Timebase};

use crate::error::StateError;

/// Listing flags for an RPC descriptor (§11.1).
pub mod rpc_flags {
    /// The descriptor's metadata (type/flags) has been resolved.
    pub const VALID: u8 = 0x80;
    /// The RPC accepts a value (can be called with an argument).
    pub const WRITABLE: u8 = 0x01;
    /// The RPC returns a value when called with no argument.
    pub const READABLE: u8 = 0x02;
    /// The RPC's value is persisted by the device across power cycles.
    pub const STORED: u8 = 0x04;
}

/// A single RPC's resolved metadata (§3, §11.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcDescriptor {
    /// Dotted path, e.g. `dev.desc` (§11.6).
    pub name: String,
    /// Numeric ordinal, if the device exposes one.
    pub ordinal: Option<u16>,
    /// Value type tag.
    pub data_type: tio_proto::TypeTag,
    /// Raw listing flags; use [`rpc_flags`] to interpret.
    pub flags: u8,
}

impl RpcDescriptor {
    /// Whether this RPC's metadata has been resolved (§11.1).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.flags & rpc_flags::VALID != 0
    }

    /// Whether this RPC can be called with an argument.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.flags & rpc_flags::WRITABLE != 0
    }

    /// Whether this RPC can be called with no argument to read a value.
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.flags & rpc_flags::READABLE != 0
    }

    /// Whether the device persists this RPC's value.
    #[must_use]
    pub fn is_stored(&self) -> bool {
        self.flags & rpc_flags::STORED != 0
    }
}

/// The metadata a session has learned about its device: timebases, sources,
/// the (at most one) stream descriptor, and the RPC table.
///
/// Populated incrementally as `TIMEBASE`/`SOURCE`/`STREAM` packets arrive;
/// never reset except by reconnection (§4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataCache {
    timebases: HashMap<u16, Timebase>,
    sources: HashMap<u16, Source>,
    sources_by_name: HashMap<String, u16>,
    stream: Option<Stream>,
    rpcs: HashMap<String, RpcDescriptor>,
}

impl MetadataCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a `TIMEBASE` descriptor.
    pub fn insert_timebase(&mut self, timebase: Timebase) {
        self.timebases.insert(timebase.timebase_id, timebase);
    }

    /// Look up a timebase by id.
    #[must_use]
    pub fn timebase(&self, id: u16) -> Option<&Timebase> {
        self.timebases.get(&id)
    }

    /// Record a `SOURCE` descriptor.
    ///
    /// # Errors
    ///
    /// [`StateError::UnknownTimebase`] if the source's `timebase_id` hasn't
    /// been seen — per §4.3 this is a no-op, not a fatal error; callers
    /// should log and continue rather than propagate.
    pub fn insert_source(&mut self, source: Source) -> Result<(), StateError> {
        if !self.timebases.contains_key(&source.timebase_id) {
            return Err(StateError::UnknownTimebase {
                kind: "source",
                id: source.source_id,
                timebase_id: source.timebase_id,
            });
        }
        self.sources_by_name.insert(source.name.clone(), source.source_id);
        self.sources.insert(source.source_id, source);
        Ok(())
    }

    /// Look up a source by id.
    #[must_use]
    pub fn source(&self, id: u16) -> Option<&Source> {
        self.sources.get(&id)
    }

    /// Look up a source by name (§3: "name... used as the lookup key").
    #[must_use]
    pub fn source_by_name(&self, name: &str) -> Option<&Source> {
        self.sources_by_name.get(name).and_then(|id| self.sources.get(id))
    }

    /// All known sources.
    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.values()
    }

    /// Record the (singular) `STREAM` descriptor.
    ///
    /// # Errors
    ///
    /// [`StateError::UnknownTimebase`] if the stream's `timebase_id` is
    /// unknown, [`StateError::UnknownSource`] if any component references an
    /// unknown source — both are no-ops per §4.3.
    pub fn set_stream(&mut self, stream: Stream) -> Result<(), StateError> {
        if !self.timebases.contains_key(&stream.timebase_id) {
            return Err(StateError::UnknownTimebase {
                kind: "stream",
                id: stream.stream_id,
                timebase_id: stream.timebase_id,
            });
        }
        for component in &stream.components {
            if !self.sources.contains_key(&component.source_id) {
                return Err(StateError::UnknownSource { source_id: component.source_id });
            }
        }
        self.stream = Some(stream);
        Ok(())
    }

    /// The current stream descriptor, if one has been received.
    #[must_use]
    pub fn stream(&self) -> Option<&Stream> {
        self.stream.as_ref()
    }

    /// Record or update an RPC descriptor.
    pub fn insert_rpc(&mut self, rpc: RpcDescriptor) {
        self.rpcs.insert(rpc.name.clone(), rpc);
    }

    /// Look up an RPC by dotted path.
    #[must_use]
    pub fn rpc(&self, name: &str) -> Option<&RpcDescriptor> {
        self.rpcs.get(name)
    }

    /// All known RPC descriptors under `prefix` (§11.6 — `RpcTable::children_of`
    /// delegates here).
    pub fn rpcs_under(&self, prefix: &str) -> impl Iterator<Item = &RpcDescriptor> {
        let prefix = prefix.to_string();
        self.rpcs.values().filter(move |rpc| rpc.name.starts_with(&prefix))
    }
}
