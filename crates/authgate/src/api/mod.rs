//! Remote API collaborator interface.
//!
//! The authentication endpoints and the generic request transport are both
//! trait seams so the coordinator can be exercised against scripted
//! collaborators in tests. [`http::HttpAuthApi`] implements both over
//! `reqwest`.

pub mod http;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::user::User;

/// Code carried by every success envelope.
pub const ENVELOPE_OK: u16 = 200;

/// Login endpoint payload: `{code, user, access}` on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginPayload {
    pub code: u16,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub access: Option<String>,
}

/// Token refresh payload: `{code, access}` on success. The refresh credential
/// itself rides the cookie side channel and never appears here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshPayload {
    pub code: u16,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub access: Option<String>,
}

/// User info payload: `{code, data}` on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfoPayload {
    pub code: u16,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<User>,
}

/// Minimal `{code}` envelope used by logout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPayload {
    pub code: u16,
    #[serde(default)]
    pub message: Option<String>,
}

/// Authentication endpoints of the remote API.
///
/// The refresh call deliberately bypasses the request gate: it must not carry
/// the (possibly expired) bearer and must never recurse into the 401-retry
/// path.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(
        &self,
        username: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<LoginPayload, ApiError>;

    async fn logout(
        &self,
        bearer: Option<&str>,
        csrf: Option<&str>,
    ) -> Result<StatusPayload, ApiError>;

    /// Exchange the cookie-borne refresh credential for a new access token.
    async fn refresh(&self) -> Result<RefreshPayload, ApiError>;

    async fn user_info(&self, bearer: &str) -> Result<UserInfoPayload, ApiError>;

    /// One-time anti-forgery bootstrap. Returns the token when it can be read
    /// from the response cookie.
    async fn csrf_bootstrap(&self) -> Result<Option<String>, ApiError>;
}

/// A request passing through the gate.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        let mut request = Self::new(Method::POST, path);
        request.body = Some(body);
        request
    }

    /// State-changing verbs carry the anti-forgery token.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::DELETE | Method::PATCH
        )
    }
}

/// A decoded response from the transport.
///
/// The gate only interprets the auth-relevant statuses (401/429/2xx); every
/// other status is handed back to the caller untouched.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Server-provided human-readable message, if any.
    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }

    /// Decode the body into a typed payload.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(self.body.clone()).map_err(|e| ApiError::Malformed(e.to_string()))
    }
}

/// Transport seam for gated requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a request, attaching the given bearer and anti-forgery values.
    ///
    /// Returns `Ok` for every HTTP status; `Err` is reserved for transport
    /// failures (connectivity, invalid URL).
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
        csrf: Option<&str>,
    ) -> Result<ApiResponse, ApiError>;
}
