//! Coordinator configuration.

use std::path::PathBuf;

/// Session coordinator configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base URL of the remote API.
    pub base_url: String,
    /// Per-request timeout in seconds (default: 30).
    pub request_timeout_secs: u64,
    /// Bounded timeout for the refresh call in seconds (default: 15).
    ///
    /// A hung refresh would otherwise block the coordinator and every queued
    /// request indefinitely; hitting the bound is treated as a refresh failure.
    pub refresh_timeout_secs: u64,
    /// Maximum number of requests that may wait on an in-flight refresh
    /// (default: 64). Callers beyond the bound are rejected immediately.
    pub pending_queue_capacity: usize,
    /// Leeway in seconds subtracted from the token expiry when deciding
    /// whether a rehydrated session needs a refresh (default: 30).
    pub token_expiry_leeway_secs: i64,
    /// Path of the long-lived user-record mirror (default: `authgate-user.json`).
    pub user_store_path: PathBuf,
    /// Name of the anti-forgery cookie set by the bootstrap endpoint
    /// (default: `csrftoken`).
    pub csrf_cookie: String,
    /// Header carrying the anti-forgery token on mutating requests
    /// (default: `X-CSRFToken`).
    pub csrf_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 30,
            refresh_timeout_secs: 15,
            pending_queue_capacity: 64,
            token_expiry_leeway_secs: 30,
            user_store_path: PathBuf::from("authgate-user.json"),
            csrf_cookie: "csrftoken".to_string(),
            csrf_header: "X-CSRFToken".to_string(),
        }
    }
}

impl AuthConfig {
    /// Create an AuthConfig from environment variables.
    ///
    /// Environment variables:
    /// - `AUTHGATE_BASE_URL`: base URL of the remote API
    /// - `AUTHGATE_REQUEST_TIMEOUT_SECS`: per-request timeout (default: 30)
    /// - `AUTHGATE_REFRESH_TIMEOUT_SECS`: refresh-call timeout (default: 15)
    /// - `AUTHGATE_PENDING_QUEUE_CAPACITY`: waiter queue bound (default: 64)
    /// - `AUTHGATE_TOKEN_EXPIRY_LEEWAY_SECS`: expiry leeway (default: 30)
    /// - `AUTHGATE_USER_STORE_PATH`: durable user-record path
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let base_url = std::env::var("AUTHGATE_BASE_URL").unwrap_or(defaults.base_url);

        let request_timeout_secs = std::env::var("AUTHGATE_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let refresh_timeout_secs = std::env::var("AUTHGATE_REFRESH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.refresh_timeout_secs);

        let pending_queue_capacity = std::env::var("AUTHGATE_PENDING_QUEUE_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.pending_queue_capacity);

        let token_expiry_leeway_secs = std::env::var("AUTHGATE_TOKEN_EXPIRY_LEEWAY_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.token_expiry_leeway_secs);

        let user_store_path = std::env::var("AUTHGATE_USER_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.user_store_path);

        Self {
            base_url,
            request_timeout_secs,
            refresh_timeout_secs,
            pending_queue_capacity,
            token_expiry_leeway_secs,
            user_store_path,
            csrf_cookie: defaults.csrf_cookie,
            csrf_header: defaults.csrf_header,
        }
    }
}
