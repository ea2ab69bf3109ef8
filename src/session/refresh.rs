//! Single-flight renewal of the access token.
//!
//! All requests that hit an authorization failure while a refresh is
//! outstanding await the same [`SharedRefresh`] instead of starting their
//! own: the backend may invalidate a refresh token once it has been used,
//! so two concurrent refreshes can log each other out.

use std::sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
};

use futures::{
    FutureExt,
    future::{self, BoxFuture, Shared},
};
use parking_lot::Mutex;

use crate::{
    error::{Result, SessionError},
    management::SessionState,
    spotify::AuthBackend,
};

/// Outcome of one refresh episode, shared by every waiter. Resolves to the
/// new access token.
pub type SharedRefresh = Shared<BoxFuture<'static, Result<String>>>;

/// Observable state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
    /// A refresh failed and the session is being torn down.
    Terminated,
}

struct Episode {
    id: u64,
    outcome: SharedRefresh,
}

enum Slot {
    Idle,
    Refreshing(Episode),
    Terminated,
}

pub struct RefreshCoordinator {
    slot: Mutex<Slot>,
    state: Arc<SessionState>,
    backend: Arc<dyn AuthBackend>,
    next_episode: AtomicU64,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("state", &self.state())
            .field("episodes", &self.episodes())
            .finish()
    }
}

impl RefreshCoordinator {
    pub fn new(state: Arc<SessionState>, backend: Arc<dyn AuthBackend>) -> Self {
        Self {
            slot: Mutex::new(Slot::Idle),
            state,
            backend,
            next_episode: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> RefreshState {
        match *self.slot.lock() {
            Slot::Idle => RefreshState::Idle,
            Slot::Refreshing(_) => RefreshState::Refreshing,
            Slot::Terminated => RefreshState::Terminated,
        }
    }

    /// Number of refresh calls started so far.
    pub fn episodes(&self) -> u64 {
        self.next_episode.load(Ordering::SeqCst)
    }

    /// Join the in-flight refresh, or start one if none is running.
    pub fn refresh(self: &Arc<Self>) -> SharedRefresh {
        let mut slot = self.slot.lock();
        match &*slot {
            Slot::Refreshing(episode) => {
                tracing::debug!(episode = episode.id, "Joining in-flight token refresh");
                return episode.outcome.clone();
            }
            Slot::Terminated => {
                return future::ready(Err(SessionError::RefreshFailed(
                    "session is being terminated".to_string(),
                )))
                .boxed()
                .shared();
            }
            Slot::Idle => {}
        }

        let id = self.next_episode.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(episode = id, "Starting token refresh");

        let outcome = run_episode(
            Arc::downgrade(self),
            Arc::clone(&self.state),
            Arc::clone(&self.backend),
            id,
        )
        .boxed()
        .shared();

        *slot = Slot::Refreshing(Episode {
            id,
            outcome: outcome.clone(),
        });
        outcome
    }

    fn settle(&self, id: u64, next: Slot) {
        let mut slot = self.slot.lock();
        let current = match &*slot {
            Slot::Refreshing(episode) => episode.id == id,
            Slot::Terminated => true,
            Slot::Idle => false,
        };
        if current {
            *slot = next;
        }
    }
}

async fn run_episode(
    coordinator: Weak<RefreshCoordinator>,
    state: Arc<SessionState>,
    backend: Arc<dyn AuthBackend>,
    id: u64,
) -> Result<String> {
    let (session, generation) = state.snapshot();
    let result = match session.and_then(|s| s.refresh_token) {
        Some(refresh_token) => exchange(&state, backend.as_ref(), &refresh_token, generation).await,
        None => Err(SessionError::RefreshFailed(
            "no refresh token available".to_string(),
        )),
    };

    match &result {
        Ok(_) => {
            tracing::info!(episode = id, "Access token refreshed");
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.settle(id, Slot::Idle);
            }
        }
        Err(e) => {
            tracing::warn!(episode = id, "Token refresh failed, ending session: {}", e);
            let coordinator = coordinator.upgrade();
            if let Some(coordinator) = &coordinator {
                coordinator.settle(id, Slot::Terminated);
            }
            match state.reset_if(generation) {
                Ok(true) => tracing::info!("Session terminated after failed refresh"),
                Ok(false) => tracing::debug!("Session changed during refresh; left in place"),
                Err(e) => tracing::warn!("Failed to clear stored session: {}", e),
            }
            if let Some(coordinator) = &coordinator {
                coordinator.settle(id, Slot::Idle);
            }
        }
    }
    result
}

async fn exchange(
    state: &SessionState,
    backend: &dyn AuthBackend,
    refresh_token: &str,
    generation: u64,
) -> Result<String> {
    let grant = backend
        .refresh(refresh_token)
        .await
        .map_err(|e| SessionError::RefreshFailed(e.to_string()))?;

    match state.apply_refresh(generation, grant) {
        Ok(Some(session)) => Ok(session.access_token),
        Ok(None) => Err(SessionError::NoSession),
        Err(e) => Err(SessionError::RefreshFailed(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        management::MemoryCredentialStore,
        types::{RefreshGrant, Session, TokenGrant, UserProfile},
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::Notify;

    #[derive(Debug, Default)]
    struct GatedBackend {
        calls: AtomicU32,
        gate: Notify,
        fail: bool,
    }

    #[async_trait]
    impl AuthBackend for GatedBackend {
        async fn exchange_code(&self, _code: &str) -> Result<TokenGrant> {
            unreachable!("not used by the coordinator")
        }

        async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            if self.fail {
                return Err(SessionError::Backend {
                    status: 400,
                    message: "invalid_grant".to_string(),
                });
            }
            assert_eq!(refresh_token, "R1");
            Ok(RefreshGrant {
                access_token: "A2".to_string(),
                refresh_token: None,
                expires_in: None,
            })
        }

        async fn fetch_profile(&self, _access_token: &str) -> Result<UserProfile> {
            unreachable!("not used by the coordinator")
        }
    }

    fn setup(fail: bool) -> (Arc<SessionState>, Arc<GatedBackend>, Arc<RefreshCoordinator>) {
        let store = Arc::new(MemoryCredentialStore::new());
        let state = Arc::new(SessionState::new(store));
        state
            .set(Session::new(
                "A1".to_string(),
                Some("R1".to_string()),
                UserProfile::new(json!({"id": "u1"})),
            ))
            .unwrap();
        let backend = Arc::new(GatedBackend {
            fail,
            ..Default::default()
        });
        let coordinator = Arc::new(RefreshCoordinator::new(state.clone(), backend.clone()));
        (state, backend, coordinator)
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_call() {
        let (state, backend, coordinator) = setup(false);

        let first = coordinator.refresh();
        let second = coordinator.refresh();
        assert_eq!(coordinator.state(), RefreshState::Refreshing);

        backend.gate.notify_one();
        let (a, b) = tokio::join!(first, second);

        assert_eq!(a.unwrap(), "A2");
        assert_eq!(b.unwrap(), "A2");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.episodes(), 1);
        assert_eq!(coordinator.state(), RefreshState::Idle);

        let session = state.get().unwrap();
        assert_eq!(session.access_token, "A2");
        assert_eq!(session.refresh_token.as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_next_failure_starts_new_episode() {
        let (_state, backend, coordinator) = setup(false);

        backend.gate.notify_one();
        coordinator.refresh().await.unwrap();
        backend.gate.notify_one();
        coordinator.refresh().await.unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.episodes(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_terminates_session() {
        let (state, backend, coordinator) = setup(true);

        let first = coordinator.refresh();
        let second = coordinator.refresh();
        backend.gate.notify_one();
        let (a, b) = tokio::join!(first, second);

        assert!(matches!(a, Err(SessionError::RefreshFailed(_))));
        assert_eq!(a, b);
        assert!(state.get().is_none());
        assert_eq!(coordinator.state(), RefreshState::Idle);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_login_during_refresh_survives_failure() {
        let (state, backend, coordinator) = setup(true);

        let pending = coordinator.refresh();
        let (result, _) = tokio::join!(pending, async {
            tokio::task::yield_now().await;
            state
                .set(Session::new(
                    "B1".to_string(),
                    Some("RB".to_string()),
                    UserProfile::new(json!({"id": "u2"})),
                ))
                .unwrap();
            backend.gate.notify_one();
        });

        assert!(result.is_err());
        assert_eq!(state.get().unwrap().access_token, "B1");
    }

    #[tokio::test]
    async fn test_missing_refresh_token_fails_without_calling_backend() {
        let (state, backend, coordinator) = setup(false);
        state
            .set(Session::new(
                "A1".to_string(),
                None,
                UserProfile::new(json!({"id": "u1"})),
            ))
            .unwrap();

        let result = coordinator.refresh().await;
        assert!(matches!(result, Err(SessionError::RefreshFailed(_))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(state.get().is_none());
    }
}
