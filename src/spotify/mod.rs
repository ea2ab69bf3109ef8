//! # Spotify Authorization Module
//!
//! This module is the integration layer between tunelink and the analysis
//! backend's Spotify endpoints. The backend owns the OAuth 2.0 client secret
//! and performs the actual exchange with Spotify; tunelink only forwards the
//! authorization code and later asks the backend for fresh access tokens.
//!
//! ## Architecture
//!
//! ```text
//! Session Layer (SessionManager, RefreshCoordinator)
//!          ↓
//! AuthBackend trait
//!          ↓
//! HttpAuthBackend (reqwest, JSON)
//!          ↓
//! Analysis backend /spotify/*
//! ```
//!
//! ## Endpoints
//!
//! - `GET /spotify/login` - Browser entry point, redirects to Spotify
//! - `GET /spotify/callback?code=...` - Code exchange, returns tokens and profile
//! - `POST /spotify/refresh` - Renews the access token for a refresh token
//! - `GET /auth/me` - Profile of the bearer (path configurable)
//!
//! ## Error Mapping
//!
//! - Connection failures and timeouts become [`SessionError::Transport`]
//! - Non-success statuses become [`SessionError::Backend`]
//! - Payloads missing `access_token` or `user` become
//!   [`SessionError::MalformedResponse`]
//!
//! [`SessionError::Transport`]: crate::SessionError::Transport
//! [`SessionError::Backend`]: crate::SessionError::Backend
//! [`SessionError::MalformedResponse`]: crate::SessionError::MalformedResponse

pub mod auth;

pub use auth::{AuthBackend, HttpAuthBackend};
