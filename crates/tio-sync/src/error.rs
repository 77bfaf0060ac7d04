//! Synchronizer error taxonomy (§7, §10.1).

use thiserror::Error;

/// Errors a [`crate::Synchronizer`] can return.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A handle couldn't catch up to the other handles' timestamp within
    /// the configured catch-up bound.
    #[error("handle {handle:?} could not be synced within {lag} samples")]
    SyncImpossible {
        /// The lagging handle's topic.
        handle: String,
        /// How many samples were discarded before giving up.
        lag: u32,
    },

    /// A steady-state read pulled a row from each handle but their
    /// timestamps didn't match.
    #[error("handle {handle:?} desynced: expected t={expected:?}, got t={got:?}")]
    Desynced {
        /// The handle whose timestamp diverged.
        handle: String,
        /// The timestamp the other handles agreed on.
        expected: Option<f64>,
        /// The timestamp this handle actually produced.
        got: Option<f64>,
    },

    /// A handle's underlying session failed.
    #[error(transparent)]
    Session(#[from] tio_session::SessionError),
}
