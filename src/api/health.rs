use axum::{Extension, response::Json};
use serde_json::{Value, json};

use crate::session::SessionManager;

pub async fn health(Extension(manager): Extension<SessionManager>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "authenticated": manager.session().is_some()
    }))
}
