//! Authorized access to the backend API.
//!
//! [`ApiClient`] authorizes every request from the live session, hands it to
//! a [`Transport`], and feeds the response back through
//! [`ApiClient::handle_response`], which recovers from an expired access
//! token by refreshing once and replaying the request.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::{
    config::Config,
    error::Result,
    session::{self, SessionManager},
    types::{ApiRequest, ApiResponse},
};

/// Sends a fully prepared request and returns the raw response.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// [`Transport`] backed by a reqwest client and a base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self::new(client, config.api_url.clone()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let res = builder.send().await?;
        let status = res.status();
        let headers = res.headers().clone();
        let body = res.bytes().await?.to_vec();

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

/// Client issuing backend requests on behalf of the current session.
#[derive(Debug, Clone)]
pub struct ApiClient {
    session: SessionManager,
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    pub fn new(session: SessionManager, transport: Arc<dyn Transport>) -> Self {
        Self { session, transport }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Attach the live access token, if any, to `request` and remember which
    /// session it was authorized under.
    pub fn authorize(&self, request: ApiRequest) -> ApiRequest {
        let (current, epoch) = self.session.current();
        let mut request = session::authorize(current.as_ref(), request);
        request.set_epoch(epoch);
        request
    }

    /// Send `request` with the current credentials, refreshing and
    /// replaying once on an authorization failure.
    ///
    /// Any HTTP status is returned as `Ok`; only transport failures are
    /// errors. Use [`ApiResponse::error_for_status`] to reject the rest.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request = self.authorize(request);
        let response = self.transport.execute(&request).await?;
        self.handle_response(request, response).await
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post_json(&self, path: &str, body: Value) -> Result<ApiResponse> {
        self.send(ApiRequest::post(path).json(body)).await
    }

    /// Recover from an authorization failure on `response`, which was
    /// received for `request`.
    ///
    /// Responses other than 401 pass through. A 401 is replayed at most
    /// once: straight away if the session was refreshed since the request
    /// was sent, otherwise after the shared refresh succeeds. A 401 for a
    /// session that has since been logged out or replaced is returned as-is,
    /// as is the original 401 when the refresh fails.
    pub async fn handle_response(
        &self,
        request: ApiRequest,
        response: ApiResponse,
    ) -> Result<ApiResponse> {
        if !response.is_authorization_failure() {
            return Ok(response);
        }

        if request.is_retry() {
            tracing::debug!(path = %request.path, "Replayed request rejected again");
            return Ok(response);
        }

        let (Some(current), epoch) = self.session.current() else {
            return Ok(response);
        };

        if request.epoch() != Some(epoch) {
            tracing::debug!(path = %request.path, "Session replaced since request was sent; not replaying");
            return Ok(response);
        }

        if request.credential() != Some(current.access_token.as_str()) {
            tracing::debug!(path = %request.path, "Token changed since request was sent; replaying");
            return self.replay(request).await.map(|r| r.unwrap_or(response));
        }

        if !current.can_refresh() {
            tracing::info!("Access token rejected and no refresh token available");
            self.session.logout();
            return Ok(response);
        }

        match self.session.refresh_session().await {
            Ok(_) => self.replay(request).await.map(|r| r.unwrap_or(response)),
            Err(e) => {
                tracing::debug!(path = %request.path, "Not replaying after refresh error: {}", e);
                Ok(response)
            }
        }
    }

    /// Re-send `request` once with the live credentials. Returns `None`
    /// when its session is gone or was replaced, so nothing is sent.
    async fn replay(&self, request: ApiRequest) -> Result<Option<ApiResponse>> {
        let (Some(current), epoch) = self.session.current() else {
            return Ok(None);
        };
        if request.epoch() != Some(epoch) {
            return Ok(None);
        }
        let request = session::authorize(Some(&current), request.into_retry());
        tracing::debug!(path = %request.path, "Replaying request with refreshed token");
        self.transport.execute(&request).await.map(Some)
    }
}
