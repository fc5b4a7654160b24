//! Scripted collaborator doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use reqwest::StatusCode;
use tokio::sync::Semaphore;

use crate::api::{
    ApiRequest, ApiResponse, AuthApi, LoginPayload, RefreshPayload, StatusPayload, Transport,
    UserInfoPayload,
};
use crate::error::ApiError;
use crate::notify::{Notifier, Severity};
use crate::user::User;

/// Route test logs to the subscriber when `RUST_LOG` is set; safe to call
/// from every test.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub(crate) fn test_user(username: &str) -> User {
    User {
        id: 1,
        username: username.to_string(),
        email: format!("{username}@example.com"),
        roles: vec!["user".to_string()],
        display_name: None,
    }
}

/// A JWT-shaped token whose `exp` claim lies the given number of seconds in
/// the future (negative for an already-expired token).
pub(crate) fn test_token(expires_in_secs: i64) -> String {
    let exp = (Utc::now() + Duration::seconds(expires_in_secs)).timestamp();
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload =
        URL_SAFE_NO_PAD.encode(serde_json::json!({ "exp": exp }).to_string().as_bytes());
    format!("{header}.{payload}.sig")
}

pub(crate) fn ok_envelope() -> serde_json::Value {
    serde_json::json!({ "code": 200 })
}

/// Scripted [`AuthApi`] double.
///
/// Each endpoint pops a scripted result if one was pushed, otherwise answers
/// with a sensible success. Call counters and an optional hold on the refresh
/// endpoint let tests assert the at-most-one-refresh property.
pub(crate) struct ScriptedAuthApi {
    fresh_token: String,
    login_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    user_info_calls: AtomicUsize,
    csrf_calls: AtomicUsize,
    login_script: Mutex<VecDeque<Result<LoginPayload, ApiError>>>,
    logout_script: Mutex<VecDeque<Result<StatusPayload, ApiError>>>,
    refresh_script: Mutex<VecDeque<Result<RefreshPayload, ApiError>>>,
    user_info_script: Mutex<VecDeque<Result<UserInfoPayload, ApiError>>>,
    refresh_hold: Mutex<Option<Arc<Semaphore>>>,
}

impl Default for ScriptedAuthApi {
    fn default() -> Self {
        Self {
            fresh_token: test_token(7200),
            login_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            user_info_calls: AtomicUsize::new(0),
            csrf_calls: AtomicUsize::new(0),
            login_script: Mutex::new(VecDeque::new()),
            logout_script: Mutex::new(VecDeque::new()),
            refresh_script: Mutex::new(VecDeque::new()),
            user_info_script: Mutex::new(VecDeque::new()),
            refresh_hold: Mutex::new(None),
        }
    }
}

impl ScriptedAuthApi {
    /// The token every unscripted refresh mints.
    pub fn fresh_token(&self) -> String {
        self.fresh_token.clone()
    }

    pub fn push_login(&self, result: Result<LoginPayload, ApiError>) {
        self.login_script.lock().push_back(result);
    }

    pub fn push_logout(&self, result: Result<StatusPayload, ApiError>) {
        self.logout_script.lock().push_back(result);
    }

    pub fn push_refresh(&self, result: Result<RefreshPayload, ApiError>) {
        self.refresh_script.lock().push_back(result);
    }

    pub fn push_user_info(&self, result: Result<UserInfoPayload, ApiError>) {
        self.user_info_script.lock().push_back(result);
    }

    /// Park every refresh call until [`Self::release_refresh`].
    pub fn hold_refresh(&self) {
        *self.refresh_hold.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_refresh(&self) {
        if let Some(sem) = self.refresh_hold.lock().as_ref() {
            sem.add_permits(1024);
        }
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn user_info_calls(&self) -> usize {
        self.user_info_calls.load(Ordering::SeqCst)
    }

    pub fn csrf_calls(&self) -> usize {
        self.csrf_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthApi for ScriptedAuthApi {
    async fn login(
        &self,
        username: &str,
        _password: &str,
        _remember_me: bool,
    ) -> Result<LoginPayload, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.login_script.lock().pop_front() {
            return result;
        }
        Ok(LoginPayload {
            code: 200,
            message: None,
            user: Some(test_user(username)),
            access: Some(test_token(3600)),
        })
    }

    async fn logout(
        &self,
        _bearer: Option<&str>,
        _csrf: Option<&str>,
    ) -> Result<StatusPayload, ApiError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.logout_script.lock().pop_front() {
            return result;
        }
        Ok(StatusPayload {
            code: 200,
            message: None,
        })
    }

    async fn refresh(&self) -> Result<RefreshPayload, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.refresh_hold.lock().clone();
        if let Some(sem) = hold {
            let _permit = sem.acquire().await;
        }
        if let Some(result) = self.refresh_script.lock().pop_front() {
            return result;
        }
        Ok(RefreshPayload {
            code: 200,
            message: None,
            access: Some(self.fresh_token.clone()),
        })
    }

    async fn user_info(&self, _bearer: &str) -> Result<UserInfoPayload, ApiError> {
        self.user_info_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.user_info_script.lock().pop_front() {
            return result;
        }
        Ok(UserInfoPayload {
            code: 200,
            message: None,
            data: Some(test_user("alice")),
        })
    }

    async fn csrf_bootstrap(&self) -> Result<Option<String>, ApiError> {
        self.csrf_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some("test-csrf-token".to_string()))
    }
}

type RecordedCall = (String, Option<String>, Option<String>);

enum TransportBehavior {
    AlwaysOk,
    UnauthorizedUnlessBearer(String),
}

/// Scripted [`Transport`] double recording every call it sees.
pub(crate) struct ScriptedTransport {
    behavior: TransportBehavior,
    calls: Mutex<Vec<RecordedCall>>,
    scripted: Mutex<HashMap<String, VecDeque<ApiResponse>>>,
}

impl ScriptedTransport {
    pub fn always_ok() -> Self {
        Self {
            behavior: TransportBehavior::AlwaysOk,
            calls: Mutex::new(Vec::new()),
            scripted: Mutex::new(HashMap::new()),
        }
    }

    /// Answer 401 unless the request carries the given bearer — the shape of
    /// a server that only accepts the freshly minted token.
    pub fn unauthorized_unless_bearer(bearer: String) -> Self {
        Self {
            behavior: TransportBehavior::UnauthorizedUnlessBearer(bearer),
            calls: Mutex::new(Vec::new()),
            scripted: Mutex::new(HashMap::new()),
        }
    }

    /// Queue a one-shot response for a path, overriding the default behavior.
    pub fn push_response(&self, path: &str, response: ApiResponse) {
        self.scripted
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
        csrf: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        self.calls.lock().push((
            request.path.clone(),
            bearer.map(str::to_string),
            csrf.map(str::to_string),
        ));

        if let Some(queue) = self.scripted.lock().get_mut(&request.path)
            && let Some(response) = queue.pop_front()
        {
            return Ok(response);
        }

        match &self.behavior {
            TransportBehavior::AlwaysOk => Ok(ApiResponse {
                status: StatusCode::OK,
                body: ok_envelope(),
            }),
            TransportBehavior::UnauthorizedUnlessBearer(expected) => {
                if bearer == Some(expected.as_str()) {
                    Ok(ApiResponse {
                        status: StatusCode::OK,
                        body: ok_envelope(),
                    })
                } else {
                    Ok(ApiResponse {
                        status: StatusCode::UNAUTHORIZED,
                        body: serde_json::json!({ "code": 401 }),
                    })
                }
            }
        }
    }
}

/// Notification sink that records everything it is told.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    notifications: Mutex<Vec<(String, String, Severity)>>,
}

impl RecordingNotifier {
    pub fn count_severity(&self, severity: Severity) -> usize {
        self.notifications
            .lock()
            .iter()
            .filter(|(_, _, s)| *s == severity)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, message: &str, severity: Severity) {
        self.notifications
            .lock()
            .push((title.to_string(), message.to_string(), severity));
    }
}
