//! Explicitly constructed wiring of the session coordinator.

use std::sync::Arc;

use tracing::debug;

use crate::api::http::HttpAuthApi;
use crate::api::{AuthApi, Transport};
use crate::config::AuthConfig;
use crate::coordinator::RefreshCoordinator;
use crate::error::AuthError;
use crate::gate::ApiClient;
use crate::lifecycle::SessionService;
use crate::notify::{Notifier, TracingNotifier};
use crate::session::SessionStore;
use crate::storage::{FileUserStore, MemoryUserStore, UserStore};

/// The fully wired session coordinator.
///
/// There is no ambient global session: the context is constructed once at
/// process bootstrap (or per test) with its collaborators injected, and
/// everything that needs session state receives a handle from here.
pub struct AuthContext {
    pub config: AuthConfig,
    pub store: Arc<SessionStore>,
    pub service: Arc<SessionService>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub client: Arc<ApiClient>,
}

impl AuthContext {
    /// Wire a context from explicit collaborators.
    pub fn new(
        config: AuthConfig,
        api: Arc<dyn AuthApi>,
        transport: Arc<dyn Transport>,
        persistent: Arc<dyn UserStore>,
        ephemeral: Arc<dyn UserStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let store = Arc::new(SessionStore::new(persistent, ephemeral));
        let service = Arc::new(SessionService::new(
            api,
            store.clone(),
            notifier.clone(),
            config.clone(),
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(
            service.clone(),
            transport.clone(),
            config.pending_queue_capacity,
        ));
        let client = Arc::new(ApiClient::new(
            transport,
            store.clone(),
            coordinator.clone(),
            notifier,
        ));
        Self {
            config,
            store,
            service,
            coordinator,
            client,
        }
    }

    /// Wire a context against the real HTTP API with the default stores and
    /// the tracing notification sink.
    pub fn with_http(config: AuthConfig) -> Result<Self, AuthError> {
        let api = Arc::new(HttpAuthApi::new(&config)?);
        let persistent = Arc::new(FileUserStore::new(config.user_store_path.clone()));
        let ephemeral = Arc::new(MemoryUserStore::default());
        let notifier = Arc::new(TracingNotifier);
        Ok(Self::new(
            config,
            api.clone(),
            api,
            persistent,
            ephemeral,
            notifier,
        ))
    }

    /// Run the one-shot session bootstrap.
    pub async fn initialize(&self) {
        self.service.initialize().await;
    }

    /// Drop volatile session state, leaving durable mirrors for the next
    /// start.
    pub fn teardown(&self) {
        debug!("Tearing down auth context");
        self.store.forget_memory();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryUserStore;
    use crate::support::{RecordingNotifier, ScriptedAuthApi, ScriptedTransport, test_user};

    fn context() -> (Arc<ScriptedAuthApi>, Arc<MemoryUserStore>, AuthContext) {
        let api = Arc::new(ScriptedAuthApi::default());
        let transport = Arc::new(ScriptedTransport::always_ok());
        let persistent = Arc::new(MemoryUserStore::default());
        let ctx = AuthContext::new(
            AuthConfig::default(),
            api.clone(),
            transport,
            persistent.clone(),
            Arc::new(MemoryUserStore::default()),
            Arc::new(RecordingNotifier::default()),
        );
        (api, persistent, ctx)
    }

    #[tokio::test]
    async fn test_cold_start_stays_logged_out() {
        let (api, _, ctx) = context();
        ctx.initialize().await;

        assert!(!ctx.store.is_authenticated());
        assert_eq!(api.refresh_calls(), 0);
        assert_eq!(api.csrf_calls(), 1);
    }

    #[tokio::test]
    async fn test_remembered_user_survives_restart() {
        let (_, persistent, ctx) = context();
        ctx.service
            .login("alice", "pw", true)
            .await
            .expect("login");
        ctx.teardown();
        assert!(!ctx.store.is_authenticated());

        // A "restart": a new context sharing only the persistent store.
        let api = Arc::new(ScriptedAuthApi::default());
        let ctx2 = AuthContext::new(
            AuthConfig::default(),
            api.clone(),
            Arc::new(ScriptedTransport::always_ok()),
            persistent,
            Arc::new(MemoryUserStore::default()),
            Arc::new(RecordingNotifier::default()),
        );
        ctx2.initialize().await;

        assert!(ctx2.store.is_authenticated());
        assert_eq!(
            ctx2.store.user().map(|u| u.username),
            Some("alice".to_string())
        );
        // The token was re-derived, not rehydrated.
        assert_eq!(api.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_non_remembered_user_does_not_survive_restart() {
        let (_, persistent, ctx) = context();
        ctx.service
            .login("alice", "pw", false)
            .await
            .expect("login");
        ctx.teardown();

        let ctx2 = AuthContext::new(
            AuthConfig::default(),
            Arc::new(ScriptedAuthApi::default()),
            Arc::new(ScriptedTransport::always_ok()),
            persistent,
            Arc::new(MemoryUserStore::default()),
            Arc::new(RecordingNotifier::default()),
        );
        ctx2.initialize().await;

        assert!(!ctx2.store.is_authenticated());
        assert!(ctx2.store.user().is_none());
    }

    #[tokio::test]
    async fn test_navigation_signal_follows_login_logout() {
        let (_, _, ctx) = context();
        let rx = ctx.store.watch_authenticated();

        ctx.service.login("alice", "pw", false).await.expect("login");
        assert!(*rx.borrow());

        ctx.service.logout().await;
        assert!(!*rx.borrow());
    }

    #[tokio::test]
    async fn test_authenticated_request_roundtrip() {
        let (_, _, ctx) = context();
        ctx.service.login("alice", "pw", false).await.expect("login");
        let user = test_user("alice");

        let response = ctx
            .client
            .post("items/", serde_json::json!({ "owner": user.username }))
            .await
            .expect("request");
        assert!(response.is_success());
        let payload: crate::api::StatusPayload = response.json().expect("decode");
        assert_eq!(payload.code, 200);
    }
}
