//! In-memory session state and its durable user-record mirror.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::events::SessionEvent;
use crate::storage::UserStore;
use crate::token::AccessToken;
use crate::user::User;

/// Capacity of the session event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Snapshot of the session state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub user: Option<User>,
    pub access_token: Option<AccessToken>,
    pub remember_me: bool,
    pub rate_limited: bool,
    pub csrf_initialized: bool,
}

impl Session {
    /// Authenticated means both halves are present.
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.access_token.is_some()
    }
}

#[derive(Default)]
struct SessionState {
    user: Option<User>,
    access_token: Option<AccessToken>,
    remember_me: bool,
    rate_limited: bool,
    csrf_initialized: bool,
    csrf_token: Option<String>,
}

/// Holder of the current session.
///
/// Pure state: no network calls, no notifications. The user record (never the
/// token) is mirrored to the durable store selected by `remember_me`; mirror
/// writes are best-effort and logged, since losing the mirror only costs a
/// re-login after restart. Mutation happens through the lifecycle manager and
/// the request gate; the navigation layer observes through [`Self::watch_authenticated`]
/// and [`Self::subscribe_events`].
pub struct SessionStore {
    state: RwLock<SessionState>,
    persistent: Arc<dyn UserStore>,
    ephemeral: Arc<dyn UserStore>,
    auth_tx: watch::Sender<bool>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    pub fn new(persistent: Arc<dyn UserStore>, ephemeral: Arc<dyn UserStore>) -> Self {
        let (auth_tx, _) = watch::channel(false);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(SessionState::default()),
            persistent,
            ephemeral,
            auth_tx,
            event_tx,
        }
    }

    /// Snapshot of the current session.
    pub fn snapshot(&self) -> Session {
        let state = self.state.read();
        Session {
            user: state.user.clone(),
            access_token: state.access_token.clone(),
            remember_me: state.remember_me,
            rate_limited: state.rate_limited,
            csrf_initialized: state.csrf_initialized,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        let state = self.state.read();
        state.user.is_some() && state.access_token.is_some()
    }

    pub fn user(&self) -> Option<User> {
        self.state.read().user.clone()
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        self.state.read().access_token.clone()
    }

    pub fn remember_me(&self) -> bool {
        self.state.read().remember_me
    }

    pub fn rate_limited(&self) -> bool {
        self.state.read().rate_limited
    }

    /// Flip the transient rate-limit flag, logging only real transitions.
    pub fn set_rate_limited(&self, limited: bool) {
        let mut state = self.state.write();
        if state.rate_limited != limited {
            debug!(limited, "Rate-limit flag changed");
            state.rate_limited = limited;
        }
    }

    pub fn csrf_initialized(&self) -> bool {
        self.state.read().csrf_initialized
    }

    pub fn csrf_token(&self) -> Option<String> {
        self.state.read().csrf_token.clone()
    }

    /// Record the one-time anti-forgery bootstrap result.
    ///
    /// The token may be absent when the transport keeps the cookie in its own
    /// jar; the flag still flips so the bootstrap is not repeated.
    pub fn mark_csrf_initialized(&self, token: Option<String>) {
        let mut state = self.state.write();
        state.csrf_initialized = true;
        state.csrf_token = token;
    }

    /// Watch channel carrying the authenticated boolean.
    pub fn watch_authenticated(&self) -> watch::Receiver<bool> {
        self.auth_tx.subscribe()
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        debug!(event = event.event_name(), "Session event");
        let _ = self.event_tx.send(event);
    }

    /// Populate the session after a successful login.
    ///
    /// Mirrors the user record to the store selected by `remember_me` and
    /// removes any mirror left in the other store.
    pub async fn set(&self, user: User, token: AccessToken, remember_me: bool) {
        {
            let mut state = self.state.write();
            state.user = Some(user.clone());
            state.access_token = Some(token);
            state.remember_me = remember_me;
        }
        self.auth_tx.send_replace(true);

        let (selected, other) = self.mirror_stores(remember_me);
        if let Err(e) = selected.save(&user).await {
            warn!(error = %e, "Failed to mirror user record (non-fatal)");
        }
        if let Err(e) = other.clear().await {
            warn!(error = %e, "Failed to clear stale user mirror (non-fatal)");
        }
    }

    /// Replace the user half of an active session and refresh its mirror.
    pub async fn set_user(&self, user: User) {
        let remember_me = {
            let mut state = self.state.write();
            state.user = Some(user.clone());
            state.remember_me
        };
        self.refresh_authenticated();

        let (selected, _) = self.mirror_stores(remember_me);
        if let Err(e) = selected.save(&user).await {
            warn!(error = %e, "Failed to mirror user record (non-fatal)");
        }
    }

    /// Install a freshly minted access token.
    ///
    /// Only valid on a session that already has a user record; a token may
    /// never outlive its identity half.
    pub fn install_token(&self, token: AccessToken) {
        {
            let mut state = self.state.write();
            if state.user.is_none() {
                warn!(
                    token_prefix = %token.prefix(),
                    "Refusing to install token without a user record"
                );
                return;
            }
            state.access_token = Some(token);
        }
        self.auth_tx.send_replace(true);
    }

    /// Rehydrate the user half from durable storage.
    ///
    /// Returns the user and whether it came from the long-lived store. The
    /// token half is never persisted and must be re-derived via refresh.
    pub async fn restore_user(&self) -> Option<(User, bool)> {
        let (user, remembered) = match self.persistent.load().await {
            Ok(Some(user)) => (user, true),
            Ok(None) => match self.ephemeral.load().await {
                Ok(Some(user)) => (user, false),
                Ok(None) => return None,
                Err(e) => {
                    warn!(error = %e, "Failed to read session-scoped user mirror");
                    return None;
                }
            },
            Err(e) => {
                warn!(error = %e, "Failed to read durable user mirror");
                return None;
            }
        };

        {
            let mut state = self.state.write();
            state.user = Some(user.clone());
            state.remember_me = remembered;
        }
        Some((user, remembered))
    }

    /// Destroy the session: null all fields and erase both durable mirrors.
    pub async fn clear(&self) {
        {
            let mut state = self.state.write();
            state.user = None;
            state.access_token = None;
            state.remember_me = false;
            state.rate_limited = false;
        }
        self.auth_tx.send_replace(false);

        if let Err(e) = self.persistent.clear().await {
            warn!(error = %e, "Failed to erase durable user mirror (non-fatal)");
        }
        if let Err(e) = self.ephemeral.clear().await {
            warn!(error = %e, "Failed to erase session-scoped user mirror (non-fatal)");
        }
    }

    /// Drop in-memory state only, leaving durable mirrors in place.
    ///
    /// Used at context teardown: a remembered user should still rehydrate on
    /// the next start.
    pub fn forget_memory(&self) {
        let mut state = self.state.write();
        state.user = None;
        state.access_token = None;
        state.rate_limited = false;
        drop(state);
        self.auth_tx.send_replace(false);
    }

    fn refresh_authenticated(&self) {
        self.auth_tx.send_replace(self.is_authenticated());
    }

    fn mirror_stores(&self, remember_me: bool) -> (&Arc<dyn UserStore>, &Arc<dyn UserStore>) {
        if remember_me {
            (&self.persistent, &self.ephemeral)
        } else {
            (&self.ephemeral, &self.persistent)
        }
    }
}
