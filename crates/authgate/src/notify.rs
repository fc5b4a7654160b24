//! User-facing notification sink.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

/// Fire-and-forget notification sink.
///
/// The coordinator treats the sink as infallible; implementations that can
/// fail should swallow and log their own errors.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str, severity: Severity);
}

/// Default sink that routes notifications to the tracing subscriber.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, title: &str, message: &str, severity: Severity) {
        match severity {
            Severity::Success | Severity::Info => {
                info!(title = %title, severity = ?severity, "{message}");
            }
            Severity::Warning => warn!(title = %title, "{message}"),
            Severity::Error => error!(title = %title, "{message}"),
        }
    }
}

/// Map a non-success HTTP status to the user-facing notification triple.
///
/// Rate limiting is deliberately a warning, not an error: it is non-terminal
/// and must not read like a logout.
pub fn status_notification(status: u16, message: Option<&str>) -> (&'static str, String, Severity) {
    match status {
        400 => (
            "Bad Request",
            message.unwrap_or("Bad request.").to_string(),
            Severity::Error,
        ),
        401 => (
            "Unauthorized",
            message.unwrap_or("Unauthorized access.").to_string(),
            Severity::Error,
        ),
        403 => (
            "Forbidden",
            message.unwrap_or("You do not have permission.").to_string(),
            Severity::Error,
        ),
        429 => (
            "Rate Limit Exceeded",
            message
                .unwrap_or("Too many requests. Please try again later.")
                .to_string(),
            Severity::Warning,
        ),
        _ => (
            "Error",
            message.unwrap_or("An unexpected error occurred.").to_string(),
            Severity::Error,
        ),
    }
}
