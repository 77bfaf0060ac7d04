//! Stream synchronizer: aligns several device sessions' streams to a
//! common time axis (§4.6).
//!
//! A [`StreamHandle`] is one session's view of a single source topic, read
//! with its time axis turned on. [`Synchronizer`] reads one row from each
//! handle in turn, using [`Synchronizer::sync`] to bring a newly-started or
//! lagging handle up to the others' timestamp and [`Synchronizer::read`]
//! for steady-state reads once aligned.

pub mod error;
pub mod handle;
pub mod sync;

pub use error::SyncError;
pub use handle::StreamHandle;
pub use sync::{DEFAULT_MAX_CATCHUP, Synchronizer};
