//! Decoded sample rows (§4.3 row decoding, §9 "Row as heterogeneous
//! sequence").
//!
//! A row's channels can differ in type across components (a vector source
//! next to a scalar temperature, say), so a row is a list of typed cells
//! rather than a single `Vec<f64>`. [`Schema::decode_row`] is the only way to
//! produce one — it slices a `STREAM0` payload according to the compiled
//! column layout.

use tio_proto::Value;

use crate::schema::Schema;

/// One decoded sample row: one [`Value`] per compiled column, in column
/// order, with an optional timestamp (§4.3: "when time-axis decoding is
/// requested").
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Seconds since the owning timebase's epoch, if time-axis decoding was
    /// requested.
    pub time: Option<f64>,
    /// One cell per compiled column, in [`Schema`] column order.
    pub cells: Vec<Value>,
}

impl Row {
    /// An empty row (no compiled schema matched this sample's byte length —
    /// §4.3: "If no schema matches... return an empty row").
    #[must_use]
    pub fn empty() -> Self {
        Self { time: None, cells: Vec::new() }
    }

    /// Whether this is the empty/unmatched-schema row.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Schema {
    /// Slice and decode `row` (a `STREAM0` payload's row bytes, *after* the
    /// leading 4-byte sample counter) according to this schema's column
    /// spans.
    ///
    /// Returns [`Row::empty`] if `row`'s length doesn't match
    /// [`Schema::row_len`] — the caller is expected to have already looked
    /// this schema up by that length (via
    /// [`crate::schema::SchemaTable::schema_for_row_len`]), so a mismatch
    /// here means the row was truncated in flight.
    #[must_use]
    pub fn decode_row(&self, row: &[u8]) -> Row {
        if row.len() != self.row_len {
            return Row::empty();
        }
        let cells = self
            .columns
            .iter()
            .filter_map(|col| {
                let size = col.data_type.fixed_size()?;
                let bytes = row.get(col.offset..col.offset + size)?;
                Value::from_bytes(col.data_type, bytes).ok()
            })
            .collect();
        Row { time: None, cells }
    }

    /// [`Schema::decode_row`], additionally stamping the row with
    /// `t = stream_start_time_sec + sample_number / stream_Fs` (§4.3), using
    /// this schema's own compiled sample period as `stream_Fs`'s reciprocal.
    #[must_use]
    pub fn decode_row_with_time(
        &self,
        row: &[u8],
        sample_number: u32,
        stream_start_time_sec: f64,
    ) -> Row {
        let mut decoded = self.decode_row(row);
        if decoded.is_empty() {
            return decoded;
        }
        let period_sec = self.sample_period_us / 1e6;
        decoded.time = Some(stream_start_time_sec + f64::from(sample_number) * period_sec);
        decoded
    }
}
