use std::collections::HashMap;

use axum::{Extension, extract::Query, response::Html};

use crate::{session::SessionManager, warning};

/// Completes a browser login.
///
/// Accepts either `?code=` (exchanged through the backend, refreshable
/// session) or `?token=` / `?access_token=` (direct bearer token, no
/// refresh). The backend redirects to `/dashboard?token=...`, so the same
/// handler serves that path as well.
pub async fn callback(
    Query(params): Query<HashMap<String, String>>,
    Extension(manager): Extension<SessionManager>,
) -> Html<&'static str> {
    if let Some(error) = params.get("error") {
        warning!("Authorization was denied: {}", error);
        return Html("<h4>Authorization denied.</h4>");
    }

    let result = if let Some(code) = params.get("code") {
        manager.login(code).await
    } else if let Some(token) = params.get("token").or_else(|| params.get("access_token")) {
        manager.login_with_token(token).await
    } else {
        return Html("<h4>Missing authorization code.</h4>");
    };

    match result {
        Ok(_) => Html("<h2>Authentication successful.</h2><p>Close browser window.</p>"),
        Err(e) => {
            warning!("Login failed: {}", e);
            Html("<h4>Login failed.</h4>")
        }
    }
}
