use std::{fmt, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{Value, json};

use crate::{
    config::Config,
    error::{Result, SessionError},
    types::{RefreshGrant, TokenGrant, UserProfile},
};

/// Path of the backend endpoint exchanging an authorization code.
pub const CALLBACK_PATH: &str = "/spotify/callback";

/// Path of the backend endpoint renewing an access token.
pub const REFRESH_PATH: &str = "/spotify/refresh";

/// Path of the backend endpoint that starts the Spotify authorization.
pub const LOGIN_PATH: &str = "/spotify/login";

/// Remote operations the session manager needs from the backend.
#[async_trait]
pub trait AuthBackend: Send + Sync + fmt::Debug {
    /// Exchange an authorization code for tokens and the user profile.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant>;

    /// Obtain a fresh access token for `refresh_token`.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant>;

    /// Fetch the profile of the user owning `access_token`.
    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile>;
}

/// [`AuthBackend`] talking to the analysis backend over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAuthBackend {
    client: Client,
    base_url: String,
    profile_path: String,
}

impl HttpAuthBackend {
    pub fn new(client: Client, base_url: impl Into<String>, profile_path: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            profile_path: profile_path.into(),
        }
    }

    /// Build a backend with its own HTTP client configured from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self::new(
            client,
            config.api_url.clone(),
            config.profile_path.clone(),
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL the user opens in a browser to start the Spotify authorization.
    pub fn login_url(&self) -> String {
        format!("{}{}", self.base_url, LOGIN_PATH)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        let res = self
            .client
            .get(self.url(CALLBACK_PATH))
            .query(&[("code", code)])
            .send()
            .await?;

        let json = read_json(res).await?;
        parse_token_grant(&json)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant> {
        let res = self
            .client
            .post(self.url(REFRESH_PATH))
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let json = read_json(res).await?;
        parse_refresh_grant(&json)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile> {
        let res = self
            .client
            .get(self.url(&self.profile_path))
            .bearer_auth(access_token)
            .send()
            .await?;

        let json = read_json(res).await?;
        if !json.is_object() {
            return Err(SessionError::MalformedResponse(
                "profile is not a JSON object".to_string(),
            ));
        }
        Ok(UserProfile::new(json))
    }
}

async fn read_json(res: Response) -> Result<Value> {
    let status = res.status();
    if !status.is_success() {
        let message = res.text().await.unwrap_or_default();
        return Err(SessionError::Backend {
            status: status.as_u16(),
            message,
        });
    }

    res.json::<Value>()
        .await
        .map_err(|e| SessionError::MalformedResponse(e.to_string()))
}

fn required_token(json: &Value, field: &str) -> Result<String> {
    match json.get(field).and_then(Value::as_str) {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => Err(SessionError::MalformedResponse(format!(
            "missing {}",
            field
        ))),
    }
}

fn optional_token(json: &Value, field: &str) -> Option<String> {
    json.get(field)
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Parse the code-exchange payload. `access_token` and `user` are required.
pub fn parse_token_grant(json: &Value) -> Result<TokenGrant> {
    let access_token = required_token(json, "access_token")?;
    let user = match json.get("user") {
        Some(user) if user.is_object() => UserProfile::new(user.clone()),
        _ => return Err(SessionError::MalformedResponse("missing user".to_string())),
    };

    Ok(TokenGrant {
        access_token,
        refresh_token: optional_token(json, "refresh_token"),
        expires_in: json.get("expires_in").and_then(Value::as_u64),
        user,
    })
}

/// Parse the refresh payload. A `refresh_token` in it means the backend
/// rotated the credential.
pub fn parse_refresh_grant(json: &Value) -> Result<RefreshGrant> {
    Ok(RefreshGrant {
        access_token: required_token(json, "access_token")?,
        refresh_token: optional_token(json, "refresh_token"),
        expires_in: json.get("expires_in").and_then(Value::as_u64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_grant() {
        let grant = parse_token_grant(&json!({
            "access_token": "A1",
            "refresh_token": "R1",
            "expires_in": 3600,
            "user": {"id": "u1"}
        }))
        .unwrap();

        assert_eq!(grant.access_token, "A1");
        assert_eq!(grant.refresh_token.as_deref(), Some("R1"));
        assert_eq!(grant.expires_in, Some(3600));
        assert_eq!(grant.user.id(), Some("u1"));
    }

    #[test]
    fn test_parse_token_grant_requires_access_token_and_user() {
        let no_token = parse_token_grant(&json!({"user": {"id": "u1"}}));
        assert!(matches!(no_token, Err(SessionError::MalformedResponse(_))));

        let no_user = parse_token_grant(&json!({"access_token": "A1"}));
        assert!(matches!(no_user, Err(SessionError::MalformedResponse(_))));

        let empty_token = parse_token_grant(&json!({"access_token": "", "user": {}}));
        assert!(matches!(empty_token, Err(SessionError::MalformedResponse(_))));
    }

    #[test]
    fn test_parse_refresh_grant_rotation() {
        let plain = parse_refresh_grant(&json!({"access_token": "A2"})).unwrap();
        assert_eq!(plain.refresh_token, None);

        let rotated =
            parse_refresh_grant(&json!({"access_token": "A2", "refresh_token": "R2"})).unwrap();
        assert_eq!(rotated.refresh_token.as_deref(), Some("R2"));

        assert!(parse_refresh_grant(&json!({"error": "invalid_grant"})).is_err());
    }

    #[test]
    fn test_login_url_trims_trailing_slash() {
        let backend = HttpAuthBackend::new(Client::new(), "http://127.0.0.1:8000/", "/auth/me");
        assert_eq!(backend.login_url(), "http://127.0.0.1:8000/spotify/login");
    }
}
