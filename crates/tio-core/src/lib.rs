//! Protocol state for TIO clients.
//!
//! Sits above `tio-proto`'s wire codec: caches device metadata
//! ([`metadata`]), compiles row schemas from it ([`schema`]), decodes
//! `STREAM0` payloads through those schemas into typed rows ([`row`]),
//! tracks a stream's sample counter ([`sample_counter`]), ties all of it
//! together per route ([`state`]), and abstracts the clock and RNG a
//! session needs ([`env`]) so session logic can be driven deterministically
//! in tests.

pub mod env;
pub mod error;
pub mod metadata;
pub mod row;
pub mod sample_counter;
pub mod schema;
pub mod state;

pub use env::Environment;
pub use error::StateError;
pub use metadata::{MetadataCache, RpcDescriptor};
pub use row::Row;
pub use sample_counter::{Advance, SampleCounter};
pub use schema::{ColumnSpan, Schema, SchemaTable};
pub use state::{Ingested, ProtocolState};
