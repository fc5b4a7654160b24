//! Client-side session and access-token coordinator for a remote HTTP API.
//!
//! The crate owns the access token's lifecycle: logging in and out,
//! serializing concurrent refresh attempts triggered by parallel requests,
//! reacting to server-side rate limiting, and emitting the
//! authenticated/unauthenticated signal a navigation layer consumes.
//!
//! # Architecture
//!
//! - [`SessionStore`]: in-memory session state, mirroring the user record
//!   (never the token) to durable storage
//! - [`SessionService`]: login / logout / refresh / info-fetch orchestration
//! - [`RefreshCoordinator`]: at most one refresh in flight, with a FIFO queue
//!   of requests deferred behind it
//! - [`ApiClient`]: the request gate attaching credentials and running the
//!   single 401 refresh-and-retry cycle
//! - [`AuthContext`]: explicit dependency-injected wiring of the above
//!
//! The remote API, durable storage and the notification sink are trait seams
//! ([`AuthApi`], [`Transport`], [`UserStore`], [`Notifier`]); production
//! implementations live in [`api::http`] and [`storage`].

pub mod api;
mod config;
mod context;
mod coordinator;
mod error;
mod events;
mod gate;
mod lifecycle;
mod notify;
mod queue;
mod session;
pub mod storage;
#[cfg(test)]
mod support;
mod token;
mod user;

pub use api::http::HttpAuthApi;
pub use api::{ApiRequest, ApiResponse, AuthApi, Transport};
pub use config::AuthConfig;
pub use context::AuthContext;
pub use coordinator::RefreshCoordinator;
pub use error::{ApiError, AuthError, Result, StorageError};
pub use events::SessionEvent;
pub use gate::ApiClient;
pub use lifecycle::{RefreshOutcome, SessionService};
pub use notify::{Notifier, Severity, TracingNotifier};
pub use session::{Session, SessionStore};
pub use storage::{FileUserStore, MemoryUserStore, UserStore};
pub use token::AccessToken;
pub use user::User;
