//! Request gate: credential attachment and auth-failure interception.

use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::api::{ApiRequest, ApiResponse, Transport};
use crate::coordinator::RefreshCoordinator;
use crate::error::AuthError;
use crate::notify::{Notifier, status_notification};
use crate::session::SessionStore;

/// Wraps every outbound application request.
///
/// Outbound, it attaches the current bearer and — for state-changing verbs —
/// the anti-forgery token. Inbound, it owns the auth-relevant statuses: a 401
/// gets exactly one refresh-and-retry cycle through the coordinator, a 429
/// flips the rate-limit flag without touching the session, and a success
/// lowers the flag again. Every other status is handed to the caller as-is.
///
/// The refresh endpoint itself never passes through here; it is reached via
/// the `AuthApi` seam so an expired bearer cannot recurse into this path.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    store: Arc<SessionStore>,
    coordinator: Arc<RefreshCoordinator>,
    notifier: Arc<dyn Notifier>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<SessionStore>,
        coordinator: Arc<RefreshCoordinator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            transport,
            store,
            coordinator,
            notifier,
        }
    }

    /// Execute a request with credential attachment and the single
    /// refresh-and-retry cycle.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, AuthError> {
        let bearer = self.store.access_token();
        let csrf = self.csrf_for(&request);
        let response = self
            .transport
            .execute(&request, bearer.as_ref().map(|t| t.as_str()), csrf.as_deref())
            .await?;

        match response.status {
            StatusCode::UNAUTHORIZED => self.retry_once(request).await,
            StatusCode::TOO_MANY_REQUESTS => {
                self.observe_rate_limit(&response);
                Err(AuthError::RateLimited)
            }
            status if status.is_success() => {
                self.store.set_rate_limited(false);
                Ok(response)
            }
            _ => Ok(response),
        }
    }

    /// Convenience wrapper for GET requests.
    pub async fn get(&self, path: impl Into<String>) -> Result<ApiResponse, AuthError> {
        self.execute(ApiRequest::get(path)).await
    }

    /// Convenience wrapper for POST requests.
    pub async fn post(
        &self,
        path: impl Into<String>,
        body: serde_json::Value,
    ) -> Result<ApiResponse, AuthError> {
        self.execute(ApiRequest::post(path, body)).await
    }

    /// The request already failed with 401 once; route it through the shared
    /// refresh and interpret its single replay. A second 401 is terminal.
    async fn retry_once(&self, request: ApiRequest) -> Result<ApiResponse, AuthError> {
        debug!(path = %request.path, "401 received; routing through refresh coordinator");

        // A refresh-level failure (rate limit, dead session) was already
        // notified once by the lifecycle manager; per-caller notifications
        // here would multiply it by the queue length.
        let response = self.coordinator.refresh_then_replay(request.clone()).await?;

        match response.status {
            StatusCode::UNAUTHORIZED => {
                warn!(path = %request.path, "Request rejected again after refresh; giving up");
                let (title, message, severity) = status_notification(401, response.message());
                self.notifier.notify(title, &message, severity);
                Err(AuthError::Unauthorized)
            }
            StatusCode::TOO_MANY_REQUESTS => {
                self.observe_rate_limit(&response);
                Err(AuthError::RateLimited)
            }
            status if status.is_success() => {
                self.store.set_rate_limited(false);
                Ok(response)
            }
            _ => Ok(response),
        }
    }

    fn csrf_for(&self, request: &ApiRequest) -> Option<String> {
        if request.is_mutating() {
            self.store.csrf_token()
        } else {
            None
        }
    }

    /// Record a 429, warning the user on the first observation only.
    fn observe_rate_limit(&self, response: &ApiResponse) {
        if self.store.rate_limited() {
            debug!("Rate limit still in effect");
            return;
        }
        self.store.set_rate_limited(true);
        let (title, message, severity) = status_notification(429, response.message());
        self.notifier.notify(title, &message, severity);
    }
}
