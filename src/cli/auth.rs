use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{oneshot, watch};

use crate::{
    cli::App, error, info, server::start_api_server, success, types::Session, warning,
};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(120);

/// Logs in with a code, a token, or through the browser.
///
/// Without `code` or `token` this starts the local listener, opens the
/// backend login page and waits up to two minutes for the callback to
/// establish a session.
pub async fn login(app: &App, code: Option<String>, token: Option<String>, open_browser: bool) {
    let result = match (code, token) {
        (Some(code), _) => app.manager.login(&code).await,
        (None, Some(token)) => app.manager.login_with_token(&token).await,
        (None, None) => {
            browser_login(app, open_browser).await;
            return;
        }
    };

    match result {
        Ok(session) => report_login(&session),
        Err(e) => error!("Login failed: {}", e),
    }
}

async fn browser_login(app: &App, open_browser: bool) {
    let mut changes = app.manager.subscribe();
    changes.borrow_and_update();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let manager = app.manager.clone();
    let addr = app.config.server_address.clone();
    let server = tokio::spawn(async move {
        start_api_server(manager, &addr, async {
            let _ = stop_rx.await;
        })
        .await
    });

    let login_url = app.backend.login_url();
    if !open_browser {
        info!("Open the following URL to log in:\n{}", login_url);
    } else if webbrowser::open(&login_url).is_err() {
        warning!(
            "Failed to open browser. Please navigate to the following URL manually:\n{}",
            login_url
        )
    }

    let pb = ProgressBar::new_spinner();
    pb.set_message("Waiting for Spotify authorization...");
    pb.enable_steady_tick(Duration::from_millis(100));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }

    let session = wait_for_session(&mut changes, LOGIN_TIMEOUT).await;
    pb.finish_and_clear();

    let _ = stop_tx.send(());
    match server.await {
        Ok(Err(e)) => warning!("Login listener stopped with an error: {}", e),
        Err(e) => warning!("Login listener crashed: {}", e),
        Ok(Ok(())) => {}
    }

    match session {
        Some(session) => report_login(&session),
        None => error!("Authentication failed or timed out."),
    }
}

/// Waits for the next change that yields a session.
async fn wait_for_session(
    changes: &mut watch::Receiver<Option<Session>>,
    max_wait: Duration,
) -> Option<Session> {
    let wait = async {
        loop {
            if changes.changed().await.is_err() {
                return None;
            }
            if let Some(session) = changes.borrow_and_update().clone() {
                return Some(session);
            }
        }
    };
    tokio::time::timeout(max_wait, wait).await.ok().flatten()
}

fn report_login(session: &Session) {
    let name = session.user.display_name().unwrap_or("unknown user");
    if session.can_refresh() {
        success!("Logged in as {}", name);
    } else {
        success!("Logged in as {} (token only, log in again when it expires)", name);
    }
}

/// Drops the session and the stored credentials.
pub fn logout(app: &App) {
    if app.manager.session().is_none() {
        info!("Not logged in.");
    }
    app.manager.logout();
    success!("Logged out.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserProfile;
    use serde_json::json;

    #[tokio::test]
    async fn test_wait_for_session_skips_logouts() {
        let (tx, mut rx) = watch::channel(None);
        rx.borrow_and_update();

        let session = Session::new("A1".to_string(), None, UserProfile::new(json!({"id": "u1"})));
        let expected = session.clone();
        tokio::spawn(async move {
            tx.send_replace(None);
            tokio::task::yield_now().await;
            tx.send_replace(Some(session));
            tokio::time::sleep(Duration::from_millis(50)).await;
        });

        let got = wait_for_session(&mut rx, Duration::from_secs(5)).await;
        assert_eq!(got, Some(expected));
    }

    #[tokio::test]
    async fn test_wait_for_session_times_out() {
        let (_tx, mut rx) = watch::channel::<Option<Session>>(None);
        rx.borrow_and_update();

        let got = wait_for_session(&mut rx, Duration::from_millis(20)).await;
        assert!(got.is_none());
    }
}
