//! Compiled row schemas (§4.3, §8 property 6).
//!
//! A `STREAM` descriptor plus the `SOURCE`s it references compile into a
//! [`Schema`]: a flat list of column spans describing how to slice a
//! `STREAM0` row's bytes. Compilation happens off to the side and is
//! published with a single pointer swap, so a reader never observes a
//! schema that's half-built — it sees either the old complete schema or the
//! new complete one, never an intermediate state.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tio_proto::TypeTag;

use crate::{error::StateError, metadata::MetadataCache};

/// One column's position and type within a compiled row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSpan {
    /// The source this column's values come from.
    pub source_id: u16,
    /// Channel index within that source (0-based).
    pub channel: u16,
    /// Byte offset within the row.
    pub offset: usize,
    /// The value's wire type.
    pub data_type: TypeTag,
}

/// A compiled row layout for a specific row byte length.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Total row length in bytes; the key this schema is published under.
    pub row_len: usize,
    /// Column spans, in the order the stream descriptor listed them.
    pub columns: Vec<ColumnSpan>,
    /// Effective sample period, in microseconds, after applying the
    /// stream's period multiplier to its timebase.
    pub sample_period_us: f64,
}

/// The live set of compiled schemas, keyed by row byte length.
///
/// Multiple schemas can be live at once: if the device reconfigures its
/// stream, in-flight `STREAM0` packets encoded under the old layout may
/// still be in the pipe. Keying by row length lets the reader dispatch each
/// row to the schema it was actually encoded with.
#[derive(Debug, Default)]
pub struct SchemaTable {
    inner: RwLock<Arc<HashMap<usize, Arc<Schema>>>>,
    current: RwLock<Option<Arc<Schema>>>,
}

impl SchemaTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: RwLock::new(Arc::new(HashMap::new())), current: RwLock::new(None) }
    }

    /// A cheap snapshot of the current schema set.
    #[must_use]
    pub fn snapshot(&self) -> Arc<HashMap<usize, Arc<Schema>>> {
        Arc::clone(&self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    /// Look up the schema for a row of `row_len` bytes.
    #[must_use]
    pub fn schema_for_row_len(&self, row_len: usize) -> Option<Arc<Schema>> {
        self.snapshot().get(&row_len).cloned()
    }

    /// The most recently compiled schema, i.e. the one matching the live
    /// stream descriptor (as opposed to an older layout still addressable
    /// for in-flight rows — see [`SchemaTable::schema_for_row_len`]).
    #[must_use]
    pub fn current(&self) -> Option<Arc<Schema>> {
        self.current.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    /// Recompile the schema for the current stream descriptor and publish
    /// it alongside whatever schemas were already live.
    ///
    /// # Errors
    ///
    /// [`StateError::UnknownSource`] if a component's source isn't in
    /// `metadata`, per §4.3 a no-op rather than fatal — callers should log
    /// and keep the previous schema set.
    pub fn recompile(&self, metadata: &MetadataCache) -> Result<(), StateError> {
        let Some(stream) = metadata.stream() else {
            return Ok(());
        };
        let Some(timebase) = metadata.timebase(stream.timebase_id) else {
            return Ok(());
        };

        let mut columns = Vec::new();
        let mut offset = 0usize;
        for component in &stream.components {
            let source = metadata
                .source(component.source_id)
                .ok_or(StateError::UnknownSource { source_id: component.source_id })?;
            #[allow(clippy::cast_possible_truncation)]
            let data_type = TypeTag::from_u8(source.data_type as u8)?;
            let elem_size = data_type.fixed_size().unwrap_or(0);
            for channel in 0..source.channels {
                columns.push(ColumnSpan { source_id: source.source_id, channel, offset, data_type });
                offset += elem_size;
            }
        }

        let sample_period_us = timebase.period_us() * f64::from(stream.period);
        let schema = Arc::new(Schema { row_len: offset, columns, sample_period_us });

        let mut guard = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut published = (**guard).clone();
        published.insert(schema.row_len, Arc::clone(&schema));
        *guard = Arc::new(published);
        drop(guard);

        let mut current = self.current.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        *current = Some(schema);
        Ok(())
    }
}
