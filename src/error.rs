//! Error types for session management and authorized requests.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that can occur while managing a session.
///
/// Every variant carries owned strings so the error is `Clone`: a refresh
/// outcome is shared between all requests waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Network/HTTP transport error.
    #[error("Network error: {0}")]
    Transport(String),

    /// Backend API answered with a non-success status.
    #[error("Backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    /// Backend answered successfully but the payload lacks required fields.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The access token could not be renewed; the session was terminated.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// An operation needed a live session and there is none.
    #[error("No active session")]
    NoSession,

    /// Persisting or clearing the credential store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        SessionError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Storage(e.to_string())
    }
}
