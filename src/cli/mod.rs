//! # CLI Module
//!
//! User-facing commands of the tunelink binary. They stand in for the pages
//! of the web client: logging in through the browser, showing who is logged
//! in, logging out, and calling backend endpoints with the session.
//!
//! ## Commands
//!
//! - [`login`] - Browser login through the local listener, or directly with
//!   `--code` / `--token`
//! - [`logout`] - Drops the session and its stored credentials
//! - [`status`] - Shows the current session as a table
//! - [`request`] - Sends an authorized request and prints the response
//!
//! ## Architecture
//!
//! ```text
//! CLI Layer (User Interface)
//!     ↓
//! Session Layer (SessionManager, ApiClient)
//!     ↓
//! Management Layer (SessionState, CredentialStore)
//!     ↓
//! Network Layer (HTTP Requests)
//! ```
//!
//! Fatal problems end the process through the `error!` macro; everything
//! else is reported with `warning!` and the command carries on.

mod auth;
mod request;
mod status;

use std::sync::Arc;

use crate::{
    client::{ApiClient, HttpTransport},
    config::Config,
    error::Result,
    management::FileCredentialStore,
    session::SessionManager,
    spotify::HttpAuthBackend,
};

pub use auth::login;
pub use auth::logout;
pub use request::request;
pub use status::status;

/// Everything a command needs, built once from the configuration.
#[derive(Debug, Clone)]
pub struct App {
    pub config: Config,
    pub backend: HttpAuthBackend,
    pub manager: SessionManager,
    pub client: ApiClient,
}

impl App {
    /// Wire store, backend, session manager and client. Reads the stored
    /// session, so the returned app is initialized.
    pub fn from_config(config: Config) -> Result<Self> {
        let backend = HttpAuthBackend::from_config(&config)?;
        let store = Arc::new(FileCredentialStore::new(&config.data_dir));
        let manager = SessionManager::restore(store, Arc::new(backend.clone()));
        let transport = Arc::new(HttpTransport::from_config(&config)?);
        let client = ApiClient::new(manager.clone(), transport);

        Ok(App {
            config,
            backend,
            manager,
            client,
        })
    }
}
