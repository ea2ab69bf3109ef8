//! Configuration management for tunelink.
//!
//! Configuration values come from environment variables, optionally seeded
//! from a `.env` file in the local data directory:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Application defaults (where applicable)

use std::{env, path::PathBuf};

use crate::error::{Result, SessionError};

pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:5173";
pub const DEFAULT_PROFILE_PATH: &str = "/auth/me";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Returns the tunelink directory inside the platform local data directory.
///
/// - Linux: `~/.local/share/tunelink`
/// - macOS: `~/Library/Application Support/tunelink`
/// - Windows: `%LOCALAPPDATA%/tunelink`
pub fn default_data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("tunelink");
    path
}

/// Loads environment variables from `tunelink/.env` in the local data directory.
///
/// Creates the directory if it doesn't exist. A missing `.env` file is not
/// an error; variables may come from the environment alone.
///
/// # Errors
///
/// Returns [`SessionError::Config`] if the directory cannot be created or
/// the `.env` file exists but cannot be parsed.
pub async fn load_env() -> Result<()> {
    let dir = default_data_dir();
    async_fs::create_dir_all(&dir)
        .await
        .map_err(|e| SessionError::Config(format!("Failed to create {}: {}", dir.display(), e)))?;

    let path = dir.join(".env");
    if path.is_file() {
        dotenv::from_path(&path)
            .map_err(|e| SessionError::Config(format!("Failed to load {}: {}", path.display(), e)))?;
    }
    Ok(())
}

/// Returns the analysis backend base URL from `TUNELINK_API_URL`.
pub fn api_url() -> Result<String> {
    let url = env::var("TUNELINK_API_URL")
        .map_err(|_| SessionError::Config("TUNELINK_API_URL must be set".to_string()))?;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(SessionError::Config(format!(
            "TUNELINK_API_URL must be an http(s) URL, got {}",
            url
        )));
    }
    Ok(url.trim_end_matches('/').to_string())
}

/// Returns the address the local callback listener binds to (`SERVER_ADDRESS`).
pub fn server_addr() -> String {
    env::var("SERVER_ADDRESS").unwrap_or_else(|_| DEFAULT_SERVER_ADDRESS.to_string())
}

/// Returns the backend path serving the bearer's profile (`TUNELINK_PROFILE_PATH`).
pub fn profile_path() -> String {
    env::var("TUNELINK_PROFILE_PATH").unwrap_or_else(|_| DEFAULT_PROFILE_PATH.to_string())
}

/// Returns the HTTP timeout in seconds (`TUNELINK_HTTP_TIMEOUT_SECS`).
pub fn http_timeout_secs() -> Result<u64> {
    match env::var("TUNELINK_HTTP_TIMEOUT_SECS") {
        Ok(raw) => raw.parse().map_err(|_| {
            SessionError::Config(format!(
                "TUNELINK_HTTP_TIMEOUT_SECS must be a number of seconds, got {}",
                raw
            ))
        }),
        Err(_) => Ok(DEFAULT_HTTP_TIMEOUT_SECS),
    }
}

/// Returns the data directory holding the session file (`TUNELINK_DATA_DIR`).
pub fn data_dir() -> PathBuf {
    env::var("TUNELINK_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_data_dir())
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub server_address: String,
    pub profile_path: String,
    pub http_timeout_secs: u64,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            api_url: api_url()?,
            server_address: server_addr(),
            profile_path: profile_path(),
            http_timeout_secs: http_timeout_secs()?,
            data_dir: data_dir(),
        })
    }
}
