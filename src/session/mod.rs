//! # Session Module
//!
//! Owns the lifecycle of a logged-in session:
//!
//! - [`authorize`] - attaches the live access token to a request
//! - [`RefreshCoordinator`] - renews the access token once per failure
//!   episode and shares the outcome with every waiting request
//! - [`SessionManager`] - login (code or token), logout and change
//!   notification, wiring state, store and backend together
//!
//! ```text
//! SessionManager::login ──► AuthBackend ──► SessionState::set ──► CredentialStore
//!                                               │
//! ApiClient::send ──► authorize ◄───────────────┘
//!        │
//!        └─ 401 ──► RefreshCoordinator ──► AuthBackend::refresh ──► replay
//! ```

mod authorizer;
mod controller;
mod refresh;

pub use authorizer::authorize;
pub use controller::SessionManager;
pub use refresh::{RefreshCoordinator, RefreshState, SharedRefresh};
