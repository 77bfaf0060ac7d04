//! A [`StreamHandle`]: one session's view of a single source topic, read
//! through a time-stamped lens so a [`crate::Synchronizer`] can align it
//! against others (§4.6).

use std::sync::Arc;

use tio_core::{Environment, Row, env::SystemEnvironment};
use tio_session::Session;

use crate::error::SyncError;

/// A session plus the source topic a synchronizer reads from it.
///
/// Constructing one turns on the owning session's time axis (§4.3), since
/// alignment is meaningless without per-row timestamps.
pub struct StreamHandle<E: Environment = SystemEnvironment> {
    session: Arc<Session<E>>,
    topic: String,
}

impl<E: Environment> StreamHandle<E> {
    /// Bind a handle to `topic` on `session`, enabling `session`'s time
    /// axis.
    pub async fn new(session: Arc<Session<E>>, topic: impl Into<String>) -> Self {
        session.set_time_axis(true).await;
        Self { session, topic: topic.into() }
    }

    /// The source topic this handle reads.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// This handle's column names, projected out of the owning session's
    /// full column list (§3).
    pub async fn column_names(&self) -> Vec<String> {
        let prefix = format!("{}.", self.topic);
        self.session
            .column_names()
            .await
            .into_iter()
            .filter(|name| *name == self.topic || name.starts_with(&prefix))
            .collect()
    }

    /// This handle's effective sample rate, in Hz (§3).
    pub async fn rate(&self) -> Option<f64> {
        self.session.rate_for(&self.topic).await
    }

    /// Pull the next time-stamped row for this handle's topic, without
    /// flushing whatever else is queued.
    pub(crate) async fn read_one(&self) -> Result<Row, SyncError> {
        let mut rows = self.session.stream_read_topic(&self.topic, 1, None).await?;
        Ok(rows.pop().unwrap_or_else(Row::empty))
    }
}
