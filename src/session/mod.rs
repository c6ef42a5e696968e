//! Session lifecycle: staged bring-up, status publication, reset.
//!
//! A session is one live [`LanguageEngine`] plus its identity. The
//! [`manager::SessionManager`] owns at most one at a time and publishes
//! bring-up progress through a watchable status cell.

pub mod dataset;
pub mod manager;

use std::fmt;

use chrono::{DateTime, Utc};

use crate::engine::LanguageEngine;

/// A ready-to-use session.
///
/// Handles are shared as `Arc<SessionHandle>`; the engine stays alive
/// until the last clone drops or the manager shuts it down on reset.
pub struct SessionHandle {
    /// Unique session identifier.
    pub id: String,
    /// The live engine backing this session.
    pub engine: Box<dyn LanguageEngine>,
    /// When bring-up of this session began.
    pub created_at: DateTime<Utc>,
    /// When the session reached `Ready`.
    pub ready_at: DateTime<Utc>,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("ready_at", &self.ready_at)
            .finish_non_exhaustive()
    }
}
