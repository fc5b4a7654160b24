//! Credential lifecycle orchestration: login, logout, refresh, info-fetch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tracing::{debug, info, instrument, warn};

use crate::api::{AuthApi, ENVELOPE_OK};
use crate::config::AuthConfig;
use crate::error::{ApiError, AuthError};
use crate::events::SessionEvent;
use crate::notify::{Notifier, Severity};
use crate::session::SessionStore;
use crate::token::AccessToken;

/// Outcome of a token refresh attempt.
///
/// The three cases are deliberately distinct: `RateLimited` means "try again
/// later, the session is intact", while `Failed` means the session is dead
/// and has already been cleared.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Success(AccessToken),
    RateLimited,
    Failed(String),
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Orchestrates the authenticated/unauthenticated state transitions against
/// the external API.
///
/// All endpoint failures are absorbed at this boundary: callers get typed
/// results, never unhandled rejections, and each terminal failure produces
/// exactly one user-facing notification.
pub struct SessionService {
    api: Arc<dyn AuthApi>,
    store: Arc<SessionStore>,
    notifier: Arc<dyn Notifier>,
    config: AuthConfig,
    initialized: AtomicBool,
}

impl SessionService {
    pub fn new(
        api: Arc<dyn AuthApi>,
        store: Arc<SessionStore>,
        notifier: Arc<dyn Notifier>,
        config: AuthConfig,
    ) -> Self {
        Self {
            api,
            store,
            notifier,
            config,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Authenticate with username and password.
    ///
    /// On any failure the session is left untouched and no retry happens; the
    /// caller decides whether to try again.
    #[instrument(skip(self, password), fields(username = %username, remember_me))]
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<(), AuthError> {
        debug!("Login attempt");

        let payload = match self.api.login(username, password, remember_me).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Login request failed");
                let err = match e {
                    ApiError::Unauthorized => {
                        AuthError::InvalidCredentials("username or password rejected".to_string())
                    }
                    other => other.into(),
                };
                self.notifier
                    .notify("Login failed", &err.to_string(), Severity::Error);
                return Err(err);
            }
        };

        if payload.code != ENVELOPE_OK {
            let message = payload
                .message
                .unwrap_or_else(|| "login rejected".to_string());
            warn!(code = payload.code, "Login rejected by server");
            self.notifier.notify("Login failed", &message, Severity::Error);
            return Err(AuthError::InvalidCredentials(message));
        }

        let (user, access) = match (payload.user, payload.access) {
            (Some(user), Some(access)) => (user, access),
            _ => {
                warn!("Login success envelope missing user or access token");
                let err = AuthError::Malformed("login envelope missing user or access".to_string());
                self.notifier
                    .notify("Login failed", &err.to_string(), Severity::Error);
                return Err(err);
            }
        };

        let token = match AccessToken::parse(access) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Login returned an undecodable access token");
                self.notifier
                    .notify("Login failed", &e.to_string(), Severity::Error);
                return Err(e);
            }
        };

        info!(
            user_id = user.id,
            token_prefix = %token.prefix(),
            expires_at = ?token.expires_at(),
            "Login successful"
        );
        let username = user.username.clone();
        self.store.set(user, token, remember_me).await;
        self.store.set_rate_limited(false);
        self.store.emit(SessionEvent::authenticated(username));
        self.notifier
            .notify("Success", "Login successful", Severity::Success);
        Ok(())
    }

    /// End the session.
    ///
    /// The endpoint call is best-effort; the local cleanup runs regardless of
    /// its outcome, so logout never fails and is idempotent when already
    /// logged out.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        debug!("Logout requested");

        let bearer = self.store.access_token();
        let csrf = self.store.csrf_token();
        if let Err(e) = self
            .api
            .logout(bearer.as_ref().map(AccessToken::as_str), csrf.as_deref())
            .await
        {
            warn!(error = %e, "Logout endpoint failed (ignored)");
        }

        self.store.clear().await;
        self.store.emit(SessionEvent::logged_out());
        info!("Logout complete");
        self.notifier
            .notify("Logged Out", "You have been logged out", Severity::Info);
    }

    /// Re-validate the user half of the session against the server.
    ///
    /// A 401 clears the session even if the token looks unexpired locally:
    /// server-side revocation wins. A 429 must never look like a logout, so
    /// the session is kept and only the rate-limit flag flips.
    pub async fn fetch_user_info(&self) -> Result<(), AuthError> {
        let Some(token) = self.store.access_token() else {
            debug!("User info requested without an access token");
            self.clear_session("user info requested without credentials")
                .await;
            return Err(AuthError::Unauthorized);
        };

        match self.api.user_info(token.as_str()).await {
            Ok(payload) if payload.code == ENVELOPE_OK => match payload.data {
                Some(user) => {
                    debug!(user_id = user.id, "User info refreshed");
                    self.store.set_user(user).await;
                    self.store.set_rate_limited(false);
                    Ok(())
                }
                None => {
                    warn!("User info success envelope missing data");
                    self.clear_session("user info envelope missing data").await;
                    Err(AuthError::Malformed(
                        "user info envelope missing data".to_string(),
                    ))
                }
            },
            Ok(payload) => {
                warn!(code = payload.code, "User info returned non-success envelope");
                self.clear_session("user info rejected").await;
                Err(AuthError::Malformed(format!(
                    "user info envelope code {}",
                    payload.code
                )))
            }
            Err(ApiError::Unauthorized) => {
                info!("User info unauthorized; clearing session");
                self.clear_session("session rejected by server").await;
                Err(AuthError::Unauthorized)
            }
            Err(ApiError::RateLimited) => {
                info!("User info rate limited; session preserved");
                self.store.set_rate_limited(true);
                Err(AuthError::RateLimited)
            }
            Err(e) => {
                warn!(error = %e, "User info fetch failed; session preserved");
                Err(e.into())
            }
        }
    }

    /// Exchange the cookie-borne refresh credential for a new access token.
    ///
    /// Bounded by `refresh_timeout_secs`: a hung refresh counts as a failure
    /// so the pending request queue can never deadlock behind it.
    #[instrument(skip(self))]
    pub async fn refresh_access_token(&self) -> RefreshOutcome {
        debug!("Access token refresh requested");

        let timeout = Duration::from_secs(self.config.refresh_timeout_secs);
        let payload = match tokio::time::timeout(timeout, self.api.refresh()).await {
            Err(_) => {
                warn!(
                    timeout_secs = self.config.refresh_timeout_secs,
                    "Token refresh timed out"
                );
                self.clear_session("token refresh timed out").await;
                return RefreshOutcome::Failed("token refresh timed out".to_string());
            }
            Ok(Err(ApiError::RateLimited)) => {
                info!("Token refresh rate limited; session preserved");
                self.store.set_rate_limited(true);
                self.notifier.notify(
                    "Rate Limit Exceeded",
                    "Too many requests. Please try again later.",
                    Severity::Warning,
                );
                return RefreshOutcome::RateLimited;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Token refresh rejected");
                self.clear_session("token refresh rejected").await;
                return RefreshOutcome::Failed(e.to_string());
            }
            Ok(Ok(payload)) => payload,
        };

        let access = match (payload.code, payload.access) {
            (ENVELOPE_OK, Some(access)) => access,
            (code, _) => {
                warn!(code, "Token refresh envelope not usable");
                self.clear_session("token refresh envelope not usable").await;
                return RefreshOutcome::Failed(format!("refresh envelope code {code}"));
            }
        };

        let token = match AccessToken::parse(access) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Refresh returned an undecodable access token");
                self.clear_session("refresh returned an undecodable token")
                    .await;
                return RefreshOutcome::Failed(e.to_string());
            }
        };

        self.store.install_token(token.clone());
        info!(
            token_prefix = %token.prefix(),
            expires_at = ?token.expires_at(),
            "Access token refreshed"
        );

        // Re-validate the identity half with the new token. A rejection here
        // means the server revoked the session between refresh and fetch.
        match self.fetch_user_info().await {
            Ok(()) => {}
            Err(AuthError::Unauthorized | AuthError::Malformed(_)) => {
                return RefreshOutcome::Failed("session rejected after refresh".to_string());
            }
            Err(e) => {
                // Transient (network, rate limit): the minted token stands,
                // the user record is one fetch stale.
                warn!(error = %e, "User info fetch after refresh failed; keeping token");
            }
        }

        RefreshOutcome::Success(token)
    }

    /// One-shot bootstrap at process start.
    ///
    /// Rehydrates the user record from durable storage, refreshes before
    /// trusting a rehydrated session (the token is never persisted), and runs
    /// the one-time anti-forgery bootstrap.
    #[instrument(skip(self))]
    pub async fn initialize(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("Initialize already ran; skipping");
            return;
        }
        info!("Initializing session");

        if self.store.user().is_none() {
            match self.store.restore_user().await {
                Some((user, remembered)) => {
                    info!(
                        username = %user.username,
                        remembered,
                        "Rehydrated user from durable storage"
                    );
                }
                None => {
                    debug!("No stored user; starting logged out");
                }
            }
        }

        if self.store.user().is_some() {
            let leeway = ChronoDuration::seconds(self.config.token_expiry_leeway_secs);
            let needs_refresh = match self.store.access_token() {
                Some(token) => token.expires_within(leeway),
                None => true,
            };
            if needs_refresh {
                match self.refresh_access_token().await {
                    RefreshOutcome::Success(_) => {}
                    RefreshOutcome::RateLimited => {
                        info!("Refresh rate limited during initialize; will retry on demand");
                    }
                    RefreshOutcome::Failed(reason) => {
                        debug!(%reason, "Stored session could not be revived");
                    }
                }
            }
        }

        self.ensure_csrf().await;
    }

    /// Clear the session and signal re-authentication, at most once per death.
    async fn clear_session(&self, reason: &str) {
        let had_session = {
            let session = self.store.snapshot();
            session.user.is_some() || session.access_token.is_some()
        };
        self.store.clear().await;
        if had_session {
            self.store.emit(SessionEvent::must_reauthenticate(reason));
            self.notifier
                .notify("Session Expired", "Please sign in again.", Severity::Error);
        }
    }

    async fn ensure_csrf(&self) {
        if self.store.csrf_initialized() {
            return;
        }
        match self.api.csrf_bootstrap().await {
            Ok(token) => {
                debug!(token_observed = token.is_some(), "Anti-forgery bootstrap complete");
                self.store.mark_csrf_initialized(token);
            }
            Err(e) => {
                // Left uninitialized so a later initialize can retry.
                warn!(error = %e, "Anti-forgery bootstrap failed");
            }
        }
    }
}
