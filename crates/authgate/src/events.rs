//! Session lifecycle events consumed by the navigation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events broadcast by the session store.
///
/// The navigation layer only needs two inputs: the authenticated boolean
/// (exposed separately as a watch channel) and `MustReauthenticate`, which
/// tells it to route to the unauthenticated entry point. The other variants
/// exist for listeners that want to react to ordinary transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A login completed and the session is fully populated.
    Authenticated {
        username: String,
        timestamp: DateTime<Utc>,
    },

    /// The user logged out deliberately.
    LoggedOut { timestamp: DateTime<Utc> },

    /// The session died underneath the user (refresh rejected, server-side
    /// revocation); the consumer should route to re-authentication.
    MustReauthenticate {
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    pub fn authenticated(username: impl Into<String>) -> Self {
        Self::Authenticated {
            username: username.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn logged_out() -> Self {
        Self::LoggedOut {
            timestamp: Utc::now(),
        }
    }

    pub fn must_reauthenticate(reason: impl Into<String>) -> Self {
        Self::MustReauthenticate {
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// Event name for subscription matching and logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Authenticated { .. } => "authenticated",
            Self::LoggedOut { .. } => "logged_out",
            Self::MustReauthenticate { .. } => "must_reauthenticate",
        }
    }
}
