//! Error types for the session coordinator.

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors raised by the durable user-record stores.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by the remote API collaborator.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server rejected the credential (HTTP 401).
    #[error("Unauthorized")]
    Unauthorized,

    /// The server is throttling us (HTTP 429).
    #[error("Rate limited - try again later")]
    RateLimited,

    /// Response body could not be decoded into the expected envelope.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Any other non-success status.
    #[error("Unexpected status {status}: {message}")]
    Unexpected { status: u16, message: String },
}

/// Errors surfaced to callers of the session coordinator.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Login was rejected by the server.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// A request was rejected with 401 after its single refresh-and-retry cycle.
    #[error("Unauthorized")]
    Unauthorized,

    /// The server is throttling requests; the session is preserved.
    #[error("Rate limited - try again later")]
    RateLimited,

    /// The refresh credential is dead; the session has been cleared.
    #[error("Session expired - re-authentication required")]
    SessionExpired,

    /// The pending request queue rejected a caller.
    #[error("Pending request queue is full")]
    QueueFull,

    /// The access token could not be decoded.
    #[error("Invalid access token: {0}")]
    Token(String),

    /// Network error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body did not match the expected envelope.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Any other non-success status observed outside the auth flow.
    #[error("Unexpected status {status}: {message}")]
    Unexpected { status: u16, message: String },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    /// Check if this error means the user must sign in again.
    pub fn requires_relogin(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::SessionExpired | Self::InvalidCredentials(_)
        )
    }

    /// Check if this error is transient and may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited | Self::QueueFull
        )
    }
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Network(e) => Self::Network(e),
            ApiError::Unauthorized => Self::Unauthorized,
            ApiError::RateLimited => Self::RateLimited,
            ApiError::Malformed(m) => Self::Malformed(m),
            ApiError::Unexpected { status, message } => Self::Unexpected { status, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_relogin() {
        assert!(AuthError::Unauthorized.requires_relogin());
        assert!(AuthError::SessionExpired.requires_relogin());
        assert!(AuthError::InvalidCredentials("bad password".into()).requires_relogin());
        assert!(!AuthError::RateLimited.requires_relogin());
        assert!(!AuthError::QueueFull.requires_relogin());
    }

    #[test]
    fn test_is_transient() {
        assert!(AuthError::RateLimited.is_transient());
        assert!(AuthError::QueueFull.is_transient());
        assert!(!AuthError::SessionExpired.is_transient());
        assert!(!AuthError::Token("garbage".into()).is_transient());
    }

    #[test]
    fn test_api_error_conversion() {
        assert!(matches!(
            AuthError::from(ApiError::Unauthorized),
            AuthError::Unauthorized
        ));
        assert!(matches!(
            AuthError::from(ApiError::RateLimited),
            AuthError::RateLimited
        ));
        let err = AuthError::from(ApiError::Unexpected {
            status: 503,
            message: "maintenance".into(),
        });
        assert!(matches!(err, AuthError::Unexpected { status: 503, .. }));
    }
}
