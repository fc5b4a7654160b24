//! `reqwest`-backed implementation of the API collaborator.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::SET_COOKIE;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{
    ApiRequest, ApiResponse, AuthApi, LoginPayload, RefreshPayload, StatusPayload, Transport,
    UserInfoPayload,
};
use crate::config::AuthConfig;
use crate::error::{ApiError, AuthError};

const LOGIN_PATH: &str = "user/api/login/";
const LOGOUT_PATH: &str = "user/api/logout/";
const REFRESH_PATH: &str = "user/api/token/refresh/";
const USER_INFO_PATH: &str = "user/api/user-info/";
const CSRF_PATH: &str = "user/api/csrf/";

/// HTTP client for the remote authentication API.
///
/// The client keeps a cookie store: the long-lived refresh credential and the
/// anti-forgery cookie are both side channels that ride it. Implements
/// [`AuthApi`] for the lifecycle endpoints and [`Transport`] for gated
/// application requests.
pub struct HttpAuthApi {
    client: reqwest::Client,
    base_url: Url,
    csrf_cookie: String,
    csrf_header: String,
}

impl HttpAuthApi {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| AuthError::Configuration(format!("invalid base URL: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .cookie_store(true)
            .build()?;
        Ok(Self {
            client,
            base_url,
            csrf_cookie: config.csrf_cookie.clone(),
            csrf_header: config.csrf_header.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::Malformed(format!("invalid endpoint {path}: {e}")))
    }

    /// Map the auth-relevant statuses, then decode the success envelope.
    async fn read_payload<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => Err(ApiError::RateLimited),
            s if s.is_success() => response
                .json::<T>()
                .await
                .map_err(|e| ApiError::Malformed(e.to_string())),
            s => {
                let message = response.text().await.unwrap_or_default();
                Err(ApiError::Unexpected {
                    status: s.as_u16(),
                    message,
                })
            }
        }
    }

    /// Pull a cookie value out of the response's `Set-Cookie` headers.
    fn cookie_value(response: &Response, name: &str) -> Option<String> {
        for header in response.headers().get_all(SET_COOKIE) {
            let Ok(raw) = header.to_str() else { continue };
            let pair = raw.split(';').next().unwrap_or_default();
            if let Some((key, value)) = pair.split_once('=')
                && key.trim() == name
            {
                return Some(value.trim().to_string());
            }
        }
        None
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(
        &self,
        username: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<LoginPayload, ApiError> {
        let url = self.endpoint(LOGIN_PATH)?;
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({
                "username": username,
                "password": password,
                "rememberMe": remember_me,
            }))
            .send()
            .await?;
        Self::read_payload(response).await
    }

    async fn logout(
        &self,
        bearer: Option<&str>,
        csrf: Option<&str>,
    ) -> Result<StatusPayload, ApiError> {
        let url = self.endpoint(LOGOUT_PATH)?;
        let mut builder = self.client.post(url);
        if let Some(bearer) = bearer {
            builder = builder.bearer_auth(bearer);
        }
        if let Some(csrf) = csrf {
            builder = builder.header(&self.csrf_header, csrf);
        }
        let response = builder.send().await?;
        Self::read_payload(response).await
    }

    async fn refresh(&self) -> Result<RefreshPayload, ApiError> {
        // No bearer here: the refresh credential rides the cookie jar, and
        // attaching an expired token would only invite a 401 loop.
        let url = self.endpoint(REFRESH_PATH)?;
        let response = self.client.post(url).send().await?;
        Self::read_payload(response).await
    }

    async fn user_info(&self, bearer: &str) -> Result<UserInfoPayload, ApiError> {
        let url = self.endpoint(USER_INFO_PATH)?;
        let response = self.client.get(url).bearer_auth(bearer).send().await?;
        Self::read_payload(response).await
    }

    async fn csrf_bootstrap(&self) -> Result<Option<String>, ApiError> {
        let url = self.endpoint(CSRF_PATH)?;
        let response = self.client.get(url).send().await?;
        let token = Self::cookie_value(&response, &self.csrf_cookie);
        debug!(token_observed = token.is_some(), "Anti-forgery bootstrap call completed");
        Ok(token)
    }
}

#[async_trait]
impl Transport for HttpAuthApi {
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
        csrf: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.endpoint(&request.path)?;
        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(bearer) = bearer {
            builder = builder.bearer_auth(bearer);
        }
        if let Some(csrf) = csrf {
            builder = builder.header(&self.csrf_header, csrf);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Ok(ApiResponse { status, body })
    }
}
