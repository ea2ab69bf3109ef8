//! # API Module
//!
//! HTTP endpoints of the local listener that completes a browser login.
//!
//! ## Endpoints
//!
//! - [`callback`] - Receives the authorization code (or a bearer token) after
//!   the user approved access and logs the session in. Mounted on
//!   `/callback` and `/dashboard`, the path the backend redirects to.
//! - [`health`] - Reports the listener version and whether a session is live.
//!
//! Both handlers take the shared [`SessionManager`](crate::session::SessionManager)
//! from an axum `Extension`.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use tunelink::server;
//!
//! let app = server::router(manager.clone());
//! ```

mod callback;
mod health;

pub use callback::callback;
pub use health::health;
