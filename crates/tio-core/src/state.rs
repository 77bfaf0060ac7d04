//! Per-route protocol state (§4.3): the session-facing façade over
//! [`MetadataCache`], [`SchemaTable`], and [`SampleCounter`].
//!
//! One [`ProtocolState`] exists per route a session is bound to (the root
//! route, and one per routed child — §4.5). It folds decoded descriptor and
//! sample packets into the cache, recompiles the row schema when metadata
//! changes, and decodes `STREAM0` rows through the live schema.

use tio_proto::Payload;
use tracing::{debug, warn};

use crate::{
    error::StateError,
    metadata::MetadataCache,
    row::Row,
    sample_counter::{Advance, SampleCounter},
    schema::SchemaTable,
};

/// What ingesting a packet did, for the caller to log or act on.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    /// A descriptor was recorded and the schema recompiled (or left
    /// unchanged, if no schema/timebase/source was affected).
    Descriptor,
    /// A `STREAM0` sample was decoded into `row` (possibly [`Row::empty`]
    /// if no schema matched its byte length), alongside the counter
    /// transition it produced.
    Sample {
        /// The decoded row, or [`Row::empty`] if no schema matched.
        row: Row,
        /// What the sample counter did relative to the previous sample.
        advance: Advance,
    },
    /// A packet type this state doesn't track (RPC traffic, logs,
    /// heartbeats) — the caller routes these elsewhere.
    NotTracked,
}

/// The accumulated protocol state for one route.
#[derive(Debug, Default)]
pub struct ProtocolState {
    metadata: MetadataCache,
    schemas: SchemaTable,
    counter: SampleCounter,
    time_axis: bool,
}

impl ProtocolState {
    /// Fresh state with no descriptors recorded yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `decode_row` should stamp rows with a timestamp (§4.3).
    pub fn set_time_axis(&mut self, enabled: bool) {
        self.time_axis = enabled;
    }

    /// The descriptor cache (timebases, sources, stream, RPC table).
    #[must_use]
    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    /// Mutable access to the descriptor cache, for callers that populate it
    /// from something other than a decoded wire packet — `rpc.listinfo`
    /// enumeration results (§11.1), which never arrive as a [`Payload`].
    pub fn metadata_mut(&mut self) -> &mut MetadataCache {
        &mut self.metadata
    }

    /// Replace the descriptor cache wholesale and recompile, the path taken
    /// when a session's handshake loads a persisted cache entry instead of
    /// enumerating cold (§4.4 step 2, §11.4).
    pub fn load_metadata(&mut self, metadata: MetadataCache) {
        self.metadata = metadata;
        self.recompile();
    }

    /// The compiled row schemas.
    #[must_use]
    pub fn schemas(&self) -> &SchemaTable {
        &self.schemas
    }

    /// Fold a decoded packet into state.
    ///
    /// Per §7, descriptor errors (unknown timebase/source references) are
    /// logged and the packet dropped rather than propagated; this never
    /// fails the way a wire-level decode does.
    pub fn ingest(&mut self, payload: &Payload) -> Ingested {
        match payload {
            Payload::Timebase(tb) => {
                self.metadata.insert_timebase(*tb);
                self.recompile();
                Ingested::Descriptor
            },
            Payload::Source(src) => {
                if let Err(err) = self.metadata.insert_source(src.clone()) {
                    warn!(error = %err, source_id = src.source_id, "dropping SOURCE with unknown timebase");
                    return Ingested::Descriptor;
                }
                self.recompile();
                Ingested::Descriptor
            },
            Payload::Stream(stream) => {
                if let Err(err) = self.metadata.set_stream(stream.clone()) {
                    warn!(error = %err, "dropping STREAM with unresolved references");
                    return Ingested::Descriptor;
                }
                self.recompile();
                Ingested::Descriptor
            },
            Payload::Stream0(sample) => {
                let advance = self.counter.observe(sample.sample_number);
                if let Advance::Gap { dropped } = advance {
                    warn!(dropped, "stream sample gap");
                } else if advance == Advance::StreamReset {
                    warn!("stream sample counter reset");
                }

                let Some(schema) = self.schemas.schema_for_row_len(sample.row.len()) else {
                    debug!(row_len = sample.row.len(), "no compiled schema for this row length yet");
                    return Ingested::Sample { row: Row::empty(), advance };
                };

                let row = if self.time_axis {
                    let start_sec = self.stream_start_time_sec().unwrap_or(0.0);
                    schema.decode_row_with_time(&sample.row, sample.sample_number, start_sec)
                } else {
                    schema.decode_row(&sample.row)
                };
                Ingested::Sample { row, advance }
            },
            Payload::Log(_) | Payload::RpcReq(_) | Payload::RpcRep(_) | Payload::RpcError(_)
            | Payload::Heartbeat(_) => Ingested::NotTracked,
        }
    }

    /// `stream_start_time_sec` per §4.3's time-axis formula: the owning
    /// timebase's `start_time_ns`, converted to seconds.
    #[must_use]
    pub fn stream_start_time_sec(&self) -> Option<f64> {
        let stream = self.metadata.stream()?;
        let timebase = self.metadata.timebase(stream.timebase_id)?;
        Some(timebase.start_time_ns as f64 / 1e9)
    }

    /// Ordered column names for the current stream (§3: "`sourceName` or
    /// `sourceName.channelName`").
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        let Some(schema) = self.schemas.current() else {
            return Vec::new();
        };
        schema
            .columns
            .iter()
            .map(|col| {
                let Some(source) = self.metadata.source(col.source_id) else {
                    return format!("source{}.ch{}", col.source_id, col.channel);
                };
                match source.column_names.get(usize::from(col.channel)) {
                    Some(channel_name) if !channel_name.is_empty() => {
                        format!("{}.{channel_name}", source.name)
                    },
                    _ if source.channels == 1 => source.name.clone(),
                    _ => format!("{}.{}", source.name, col.channel),
                }
            })
            .collect()
    }

    /// Effective sample rate, in Hz, for the named source's column span —
    /// `1e6 / (timebase_period_us * stream_period * component_period)` (§3).
    #[must_use]
    pub fn rate_for(&self, source_name: &str) -> Option<f64> {
        let schema = self.schemas.current()?;
        let source = self.metadata.source_by_name(source_name)?;
        schema.columns.iter().find(|col| col.source_id == source.source_id)?;
        Some(1e6 / schema.sample_period_us)
    }

    fn recompile(&mut self) {
        if let Err(err) = self.schemas.recompile(&self.metadata) {
            warn!(error = %err, "schema recompilation deferred: unresolved reference");
        }
    }
}
