use tabled::Table;

use crate::{
    cli::App,
    types::{Session, SessionTableRow},
    warning,
};

pub fn status(app: &App) {
    match app.manager.session() {
        Some(session) => println!("{}", Table::new(session_rows(&session))),
        None => warning!("Not logged in. Run tunelink login."),
    }
}

fn mask(token: &str) -> String {
    let visible: String = token.chars().take(6).collect();
    if visible.len() < token.len() {
        format!("{}…", visible)
    } else {
        "…".to_string()
    }
}

fn row(field: &str, value: impl Into<String>) -> SessionTableRow {
    SessionTableRow {
        field: field.to_string(),
        value: value.into(),
    }
}

fn session_rows(session: &Session) -> Vec<SessionTableRow> {
    let expires = match session.expires_at {
        Some(at) if session.is_expired() => format!("{} (expired)", at.to_rfc3339()),
        Some(at) => at.to_rfc3339(),
        None => "unknown".to_string(),
    };

    vec![
        row("user", session.user.id().unwrap_or("-")),
        row("name", session.user.display_name().unwrap_or("-")),
        row("access token", mask(&session.access_token)),
        row(
            "refresh token",
            session.refresh_token.as_deref().map(mask).unwrap_or_else(|| "none".to_string()),
        ),
        row("issued at", session.issued_at.to_rfc3339()),
        row("expires at", expires),
    ]
}
