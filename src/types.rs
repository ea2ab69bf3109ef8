use chrono::{DateTime, Duration, Utc};
use reqwest::{
    Method, StatusCode,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tabled::Tabled;

use crate::error::{Result, SessionError};

/// Profile returned by the backend identity endpoint.
///
/// The payload is kept as-is; accessors only peek at well-known fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(pub Value);

impl UserProfile {
    pub fn new(value: Value) -> Self {
        UserProfile(value)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn display_name(&self) -> Option<&str> {
        self.0
            .get("display_name")
            .and_then(Value::as_str)
            .or_else(|| self.id())
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// The logged-in user's credentials and profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: UserProfile,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(access_token: String, refresh_token: Option<String>, user: UserProfile) -> Self {
        Session {
            access_token,
            refresh_token,
            user,
            issued_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn from_grant(grant: TokenGrant) -> Self {
        let mut session = Session::new(grant.access_token, grant.refresh_token, grant.user);
        session.expires_at = expiry_from(session.issued_at, grant.expires_in);
        session
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}

pub(crate) fn expiry_from(from: DateTime<Utc>, expires_in: Option<u64>) -> Option<DateTime<Utc>> {
    expires_in
        .and_then(|secs| i64::try_from(secs).ok())
        .map(|secs| from + Duration::seconds(secs))
}

/// Result of exchanging an authorization code.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub user: UserProfile,
}

/// Result of a token refresh. `refresh_token` is set only when the backend
/// rotates it.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

/// What a route guard may conclude about the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Storage has not been consulted yet.
    Unknown,
    Anonymous,
    Authenticated,
}

/// An outbound request to the backend API.
///
/// Requests are cheap to clone so a failed one can be replayed after a
/// token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    retried: bool,
    credential: Option<String>,
    epoch: Option<u64>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            retried: false,
            credential: None,
            epoch: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Whether this request is already a replay after a refresh.
    pub fn is_retry(&self) -> bool {
        self.retried
    }

    /// The access token this request was authorized with, if any.
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    pub(crate) fn set_credential(&mut self, credential: Option<String>) {
        self.credential = credential;
    }

    /// Epoch of the session this request was authorized under.
    pub fn epoch(&self) -> Option<u64> {
        self.epoch
    }

    pub(crate) fn set_epoch(&mut self, epoch: u64) {
        self.epoch = Some(epoch);
    }

    pub(crate) fn into_retry(mut self) -> Self {
        self.retried = true;
        self
    }
}

/// A response from the backend API.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        ApiResponse {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_authorization_failure(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(SessionError::Backend {
                status: self.status.as_u16(),
                message: self.text(),
            })
        }
    }
}

#[derive(Tabled)]
pub struct SessionTableRow {
    pub field: String,
    pub value: String,
}
