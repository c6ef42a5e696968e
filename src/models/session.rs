//! Session status model and bring-up stage helpers.

use serde::{Deserialize, Serialize};

/// Lifecycle status for the interpreter session.
///
/// The serialized form uses the kebab-case vocabulary that frontends key
/// their loading screens on (`"installing-packages"`, `"loading-data"`),
/// so the wire strings are part of the crate's contract.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    /// No session exists and no bring-up attempt has started.
    Uninitialized,
    /// The engine adapter is being constructed and booted.
    Loading,
    /// Required add-on packages are being provisioned into the engine.
    InstallingPackages,
    /// The lesson dataset is being fetched and written into the engine.
    LoadingData,
    /// The session is live and can evaluate code.
    Ready,
    /// Bring-up failed; recovery requires an explicit reset.
    Error,
}

impl SessionStatus {
    /// Whether this status ends a bring-up attempt (`Ready` or `Error`).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }

    /// Coarse bring-up progress for frontend progress bars.
    ///
    /// `Error` reports zero so a retry restarts the bar from the left.
    #[must_use]
    pub fn progress_percent(self) -> u8 {
        match self {
            Self::Uninitialized | Self::Error => 0,
            Self::Loading => 20,
            Self::InstallingPackages => 50,
            Self::LoadingData => 80,
            Self::Ready => 100,
        }
    }

    /// Determine whether a bring-up stage transition is permitted.
    ///
    /// The forward chain is `Uninitialized → Loading → InstallingPackages →
    /// LoadingData → Ready`; any non-terminal state may fall to `Error`.
    /// A `reset` returns the cell to `Uninitialized` outside this predicate.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Uninitialized, Self::Loading)
                | (Self::Loading, Self::InstallingPackages)
                | (Self::InstallingPackages, Self::LoadingData)
                | (Self::LoadingData, Self::Ready)
                | (
                    Self::Uninitialized
                        | Self::Loading
                        | Self::InstallingPackages
                        | Self::LoadingData,
                    Self::Error
                )
        )
    }
}

/// Snapshot published through the session manager's status cell.
///
/// `error` is populated only when `status` is [`SessionStatus::Error`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionState {
    /// Current bring-up status.
    pub status: SessionStatus,
    /// Human-readable failure message for the `Error` status.
    pub error: Option<String>,
}

impl SessionState {
    /// State before any bring-up attempt.
    #[must_use]
    pub fn idle() -> Self {
        Self {
            status: SessionStatus::Uninitialized,
            error: None,
        }
    }

    /// Non-error state at the given status.
    #[must_use]
    pub fn at(status: SessionStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    /// Error state carrying the failure message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: SessionStatus::Error,
            error: Some(message.into()),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::idle()
    }
}
