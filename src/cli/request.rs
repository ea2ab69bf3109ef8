use std::str::FromStr;

use reqwest::Method;
use serde_json::Value;

use crate::{
    cli::App,
    error::{Result, SessionError},
    types::{ApiRequest, ApiResponse},
    warning,
};

/// Sends an authorized request to the backend and prints the response body.
pub async fn request(app: &App, method: &str, path: &str, data: Option<String>) {
    let had_session = app.manager.session().is_some();
    if !had_session {
        warning!("Not logged in; sending the request without credentials.");
    }

    let response = match build_request(method, path, data) {
        Ok(request) => app.client.send(request).await,
        Err(e) => crate::error!("{}", e),
    };

    let response = match response {
        Ok(response) => response,
        Err(e) => crate::error!("Request failed: {}", e),
    };

    if had_session && app.manager.session().is_none() {
        warning!("Session expired. Run tunelink login.");
    }

    println!("{}", render_body(&response));
    if !response.status.is_success() {
        crate::error!("Backend answered {}", response.status);
    }
}

fn build_request(method: &str, path: &str, data: Option<String>) -> Result<ApiRequest> {
    let method = Method::from_str(&method.to_uppercase())
        .map_err(|_| SessionError::InvalidRequest(format!("unknown method {}", method)))?;

    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    let mut request = ApiRequest::new(method, path);
    if let Some(data) = data {
        let body: Value = serde_json::from_str(&data)
            .map_err(|e| SessionError::InvalidRequest(format!("--data is not JSON: {}", e)))?;
        request = request.json(body);
    }
    Ok(request)
}

fn render_body(response: &ApiResponse) -> String {
    match response.json::<Value>() {
        Ok(json) => serde_json::to_string_pretty(&json).unwrap_or_else(|_| response.text()),
        Err(_) => response.text(),
    }
}
