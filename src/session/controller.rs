use std::sync::Arc;

use tokio::sync::watch;

use crate::{
    error::{Result, SessionError},
    management::{CredentialStore, ListenerId, SessionListener, SessionState},
    session::refresh::{RefreshCoordinator, RefreshState},
    spotify::AuthBackend,
    types::{Access, Session, TokenGrant},
};

/// Entry point for logging in and out and for observing the session.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Debug, Clone)]
pub struct SessionManager {
    state: Arc<SessionState>,
    backend: Arc<dyn AuthBackend>,
    refresh: Arc<RefreshCoordinator>,
}

impl SessionManager {
    /// Create a manager whose state has not been read from `store` yet.
    pub fn new(store: Arc<dyn CredentialStore>, backend: Arc<dyn AuthBackend>) -> Self {
        let state = Arc::new(SessionState::new(store));
        let refresh = Arc::new(RefreshCoordinator::new(
            Arc::clone(&state),
            Arc::clone(&backend),
        ));
        Self {
            state,
            backend,
            refresh,
        }
    }

    /// Create a manager and reconstitute the stored session.
    pub fn restore(store: Arc<dyn CredentialStore>, backend: Arc<dyn AuthBackend>) -> Self {
        let manager = Self::new(store, backend);
        manager.initialize();
        manager
    }

    pub fn initialize(&self) -> Option<Session> {
        self.state.initialize()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    /// Route-guard view of the session.
    pub fn access(&self) -> Access {
        self.state.access()
    }

    pub fn session(&self) -> Option<Session> {
        self.state.get()
    }

    /// The session with its epoch, which changes on login and logout but
    /// not on refresh.
    pub fn current(&self) -> (Option<Session>, u64) {
        self.state.current()
    }

    /// Log in with an authorization code. On failure the current session,
    /// if any, is left untouched.
    pub async fn login(&self, code: &str) -> Result<Session> {
        let grant = self.backend.exchange_code(code).await.inspect_err(|e| {
            tracing::warn!("Authorization code exchange failed: {}", e);
        })?;
        self.establish(grant)
    }

    /// Log in with a bearer token obtained elsewhere. The session has no
    /// refresh token, so the first authorization failure ends it.
    pub async fn login_with_token(&self, token: &str) -> Result<Session> {
        if token.trim().is_empty() {
            return Err(SessionError::InvalidRequest(
                "access token must not be empty".to_string(),
            ));
        }
        let user = self.backend.fetch_profile(token).await.inspect_err(|e| {
            tracing::warn!("Profile lookup for token login failed: {}", e);
        })?;
        self.establish(TokenGrant {
            access_token: token.to_string(),
            refresh_token: None,
            expires_in: None,
            user,
        })
    }

    fn establish(&self, grant: TokenGrant) -> Result<Session> {
        let session = Session::from_grant(grant);
        self.state.set(session.clone())?;
        tracing::info!(
            user = session.user.id().unwrap_or("unknown"),
            refreshable = session.can_refresh(),
            "Logged in"
        );
        Ok(session)
    }

    /// Drop the session and its stored credentials. Safe to call at any
    /// time, including when already logged out.
    pub fn logout(&self) {
        match self.state.reset() {
            Ok(()) => tracing::info!("Logged out"),
            Err(e) => tracing::warn!("Logged out, but clearing stored session failed: {}", e),
        }
    }

    /// Obtain a fresh access token, joining an in-flight refresh if there
    /// is one. A failure ends the session.
    pub async fn refresh_session(&self) -> Result<String> {
        self.refresh.refresh().await
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.refresh.state()
    }

    /// Number of refresh calls made to the backend so far.
    pub fn refresh_count(&self) -> u64 {
        self.refresh.episodes()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.state.subscribe()
    }

    pub fn on_session_change<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(Option<&Session>) + Send + Sync + 'static,
    {
        let listener: SessionListener = Arc::new(callback);
        self.state.on_change(listener)
    }

    pub fn remove_session_listener(&self, id: ListenerId) -> bool {
        self.state.remove_listener(id)
    }
}
