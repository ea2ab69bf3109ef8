//! Attaches the access token to outbound requests.

use reqwest::header::{AUTHORIZATION, HeaderValue};

use crate::types::{ApiRequest, Session};

/// Authorize `request` for `session`.
///
/// With a session the request carries `Authorization: Bearer <token>` and
/// remembers which token it was sent with; without one any existing
/// `Authorization` header is removed. Applied the same way to every request.
pub fn authorize(session: Option<&Session>, mut request: ApiRequest) -> ApiRequest {
    request.headers.remove(AUTHORIZATION);

    let Some(session) = session else {
        request.set_credential(None);
        return request;
    };

    match HeaderValue::from_str(&format!("Bearer {}", session.access_token)) {
        Ok(mut value) => {
            value.set_sensitive(true);
            request.headers.insert(AUTHORIZATION, value);
            request.set_credential(Some(session.access_token.clone()));
        }
        Err(_) => {
            tracing::warn!("Access token is not a valid header value; sending unauthenticated");
            request.set_credential(None);
        }
    }
    request
}
