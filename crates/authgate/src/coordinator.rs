//! Serialization of concurrent token-refresh attempts.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{ApiRequest, ApiResponse, Transport};
use crate::error::AuthError;
use crate::lifecycle::{RefreshOutcome, SessionService};
use crate::queue::PendingQueue;

enum CoordState {
    Idle,
    Refreshing(PendingQueue),
}

/// Guarantees at most one refresh call in flight across the whole process.
///
/// The first caller that needs a refresh becomes the leader and runs it; any
/// caller arriving while the refresh is in flight parks its request in the
/// pending queue instead of starting a second refresh. When the refresh
/// resolves, the leader drains the queue in FIFO order — replaying with the
/// new token on success, rejecting with a typed outcome otherwise — and only
/// then does the state return to idle, so a new refresh can never start
/// while stale queued replays are still running.
pub struct RefreshCoordinator {
    service: Arc<SessionService>,
    transport: Arc<dyn Transport>,
    state: Mutex<CoordState>,
    queue_capacity: usize,
}

impl RefreshCoordinator {
    pub fn new(
        service: Arc<SessionService>,
        transport: Arc<dyn Transport>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            service,
            transport,
            state: Mutex::new(CoordState::Idle),
            queue_capacity,
        }
    }

    /// Entry point for the gate when a request got a 401 on its first try.
    ///
    /// Resolves to the request's replay response after a successful refresh,
    /// or to the typed outcome of the shared refresh otherwise.
    pub async fn refresh_then_replay(
        &self,
        request: ApiRequest,
    ) -> Result<ApiResponse, AuthError> {
        let waiter = {
            let mut state = self.state.lock().await;
            match &mut *state {
                CoordState::Idle => {
                    *state = CoordState::Refreshing(PendingQueue::new(self.queue_capacity));
                    None
                }
                CoordState::Refreshing(queue) => Some(queue.enqueue(request.clone())?),
            }
        };

        if let Some(rx) = waiter {
            debug!(path = %request.path, "Refresh in flight; request queued");
            return match rx.await {
                Ok(result) => result,
                // The drain loop dropped our handle without completing it;
                // treat as a dead session rather than hanging forever.
                Err(_) => Err(AuthError::SessionExpired),
            };
        }

        self.lead_refresh(request).await
    }

    async fn lead_refresh(&self, request: ApiRequest) -> Result<ApiResponse, AuthError> {
        debug!(path = %request.path, "Leading token refresh");
        let outcome = self.service.refresh_access_token().await;

        // Drain while holding the state lock: nobody may observe Idle (and
        // start another refresh) until every queued replay has finished.
        let mut state = self.state.lock().await;
        let entries = match &mut *state {
            CoordState::Refreshing(queue) => queue.take_entries(),
            CoordState::Idle => {
                warn!("Coordinator state lost its refresh marker; treating as empty queue");
                Default::default()
            }
        };

        let lead_result = match outcome {
            RefreshOutcome::Success(token) => {
                info!(queued = entries.len(), "Refresh succeeded; replaying requests");
                let bearer = token.as_str().to_string();
                let csrf = self.service.store().csrf_token();

                // The leader's own request triggered the refresh and arrived
                // first; it replays first, then the queue in enqueue order.
                let lead_result = self.replay(&request, &bearer, csrf.as_deref()).await;
                for entry in entries {
                    let result = self.replay(&entry.request, &bearer, csrf.as_deref()).await;
                    let _ = entry.completion.send(result);
                }
                lead_result
            }
            RefreshOutcome::RateLimited => {
                info!(queued = entries.len(), "Refresh rate limited; rejecting queued requests");
                for entry in entries {
                    let _ = entry.completion.send(Err(AuthError::RateLimited));
                }
                Err(AuthError::RateLimited)
            }
            RefreshOutcome::Failed(reason) => {
                warn!(
                    queued = entries.len(),
                    %reason,
                    "Refresh failed; rejecting queued requests"
                );
                for entry in entries {
                    let _ = entry.completion.send(Err(AuthError::SessionExpired));
                }
                Err(AuthError::SessionExpired)
            }
        };

        *state = CoordState::Idle;
        lead_result
    }

    async fn replay(
        &self,
        request: &ApiRequest,
        bearer: &str,
        csrf: Option<&str>,
    ) -> Result<ApiResponse, AuthError> {
        let csrf = if request.is_mutating() { csrf } else { None };
        self.transport
            .execute(request, Some(bearer), csrf)
            .await
            .map_err(AuthError::from)
    }
}
