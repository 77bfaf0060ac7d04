//! Router error taxonomy (§7, §10.1).

use thiserror::Error;

/// Errors a [`crate::Router`] can return.
#[derive(Error, Debug)]
pub enum RouterError {
    /// No child session is bound to the given routing key — either none
    /// has ever been observed, or its handshake hasn't completed yet.
    #[error("no running child session bound to routing key {0:?}")]
    UnknownChild(String),

    /// The root session, or a child session reached through it, failed.
    #[error(transparent)]
    Session(#[from] tio_session::SessionError),
}
