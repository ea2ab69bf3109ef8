//! tunelink Session Library
//!
//! This library keeps a user logged in to the Spotify-backed music analysis
//! API. It stores the access and refresh tokens across restarts, attaches the
//! access token to every backend request, and when the backend rejects an
//! expired token it refreshes the token once for all concurrent requests and
//! replays them.
//!
//! # Modules
//!
//! - `api` - HTTP endpoints of the local login listener
//! - `cli` - Command-line interface implementations
//! - `client` - Authorized backend client with refresh-and-replay
//! - `config` - Configuration management and environment variables
//! - `error` - Error type shared by all modules
//! - `management` - Credential storage and live session state
//! - `server` - Local HTTP server for login callbacks
//! - `session` - Login/logout, request authorization and token refresh
//! - `spotify` - Backend Spotify authorization endpoints
//! - `types` - Data structures and type definitions
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tunelink::{config, client::{ApiClient, HttpTransport}, management::FileCredentialStore,
//!     session::SessionManager, spotify::HttpAuthBackend};
//!
//! #[tokio::main]
//! async fn main() -> tunelink::Result<()> {
//!     config::load_env().await?;
//!     let config = config::Config::from_env()?;
//!     let manager = SessionManager::restore(
//!         Arc::new(FileCredentialStore::new(&config.data_dir)),
//!         Arc::new(HttpAuthBackend::from_config(&config)?),
//!     );
//!     let client = ApiClient::new(manager, Arc::new(HttpTransport::from_config(&config)?));
//!     let top = client.get("/analysis/top-tracks").await?.error_for_status()?;
//!     println!("{}", top.text());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod management;
pub mod server;
pub mod session;
pub mod spotify;
pub mod types;

pub use error::{Result, SessionError};

/// Prints an informational message with a blue bullet point.
///
/// # Example
///
/// ```
/// info!("Opening browser for Spotify authorization...");
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
///
/// # Example
///
/// ```
/// success!("Logged in as {}", name);
/// ```
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits the program.
///
/// Only for fatal errors in the binary; library code returns errors instead.
///
/// # Example
///
/// ```
/// error!("Failed to load configuration: {}", e);
/// // Program exits here - code after this will not execute
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
///
/// # Example
///
/// ```
/// warning!("Session expired, please log in again");
/// ```
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
