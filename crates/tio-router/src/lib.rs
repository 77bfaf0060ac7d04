//! Routing demultiplexer for TIO sessions (§4.5, §11.5).
//!
//! A single physical transport can carry traffic for several logical
//! devices, each addressed by a distinct routing prefix (§3, §6). A
//! [`Session`](tio_session::Session) only parses packets whose routing
//! matches its own; everything else it hands to a registered router
//! callback instead of dropping it. [`Router`] is that callback's
//! consumer: it keeps a map from routing key to child session, creating
//! children lazily the first time their prefix is observed and running
//! each child's handshake/enumeration on a spawned task so a slow or
//! unresponsive device never blocks the router's demux loop or its
//! caller.

pub mod error;
pub mod router;

pub use error::RouterError;
pub use router::Router;
