use std::{
    cell::Cell,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use chrono::Utc;
use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::watch;

use crate::{
    error::Result,
    management::store::{CredentialStore, Loaded},
    types::{Access, RefreshGrant, Session, expiry_from},
};

/// Callback invoked after every session change.
pub type SessionListener = Arc<dyn Fn(Option<&Session>) + Send + Sync>;

/// Handle returned by [`SessionState::on_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Inner {
    session: Option<Session>,
    /// Bumped by every mutation.
    generation: u64,
    /// Bumped when a session is established or dropped, but not when its
    /// access token is refreshed.
    epoch: u64,
}

/// The live session (or none) and its persistence.
///
/// Every mutation writes the store and swaps the in-memory value under one
/// lock, so a concurrent reader sees either the old or the new session.
/// Change notifications are delivered in generation order; one that is
/// overtaken by a newer change is dropped.
pub struct SessionState {
    inner: Mutex<Inner>,
    store: Arc<dyn CredentialStore>,
    initialized: AtomicBool,
    changes: watch::Sender<Option<Session>>,
    listeners: Mutex<Vec<(ListenerId, SessionListener)>>,
    next_listener: AtomicU64,
    delivered: ReentrantMutex<Cell<u64>>,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SessionState")
            .field("present", &inner.session.is_some())
            .field("generation", &inner.generation)
            .field("epoch", &inner.epoch)
            .field("initialized", &self.is_initialized())
            .field("store", &self.store)
            .finish()
    }
}

impl SessionState {
    /// Create an uninitialized state; call [`SessionState::initialize`] to
    /// read the store.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            inner: Mutex::new(Inner::default()),
            store,
            initialized: AtomicBool::new(false),
            changes,
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            delivered: ReentrantMutex::new(Cell::new(0)),
        }
    }

    /// Reconstitute the session from the store. Only the first call reads
    /// it; corrupt data is cleared.
    pub fn initialize(&self) -> Option<Session> {
        let (restored, generation) = {
            let mut inner = self.inner.lock();
            if self.initialized.load(Ordering::SeqCst) {
                return inner.session.clone();
            }

            let restored = match self.store.load() {
                Loaded::Found(session) => Some(session),
                Loaded::Missing => None,
                Loaded::Corrupt(reason) => {
                    tracing::warn!("Discarding unreadable stored session: {}", reason);
                    if let Err(e) = self.store.clear() {
                        tracing::warn!("Failed to clear stored session: {}", e);
                    }
                    None
                }
            };

            // A login that raced initialization wins over stored data.
            if inner.session.is_none() && restored.is_some() {
                inner.session = restored;
                inner.generation += 1;
                inner.epoch += 1;
            }
            self.initialized.store(true, Ordering::SeqCst);
            (inner.session.clone(), inner.generation)
        };

        if restored.is_some() {
            tracing::info!("Restored stored session");
            self.notify(generation, restored.clone());
        }
        restored
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn access(&self) -> Access {
        if !self.is_initialized() {
            return Access::Unknown;
        }
        match self.inner.lock().session {
            Some(_) => Access::Authenticated,
            None => Access::Anonymous,
        }
    }

    pub fn get(&self) -> Option<Session> {
        self.inner.lock().session.clone()
    }

    /// Current session together with its generation.
    pub fn snapshot(&self) -> (Option<Session>, u64) {
        let inner = self.inner.lock();
        (inner.session.clone(), inner.generation)
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Current session together with its epoch. The epoch survives token
    /// refreshes and changes on login, logout and termination.
    pub fn current(&self) -> (Option<Session>, u64) {
        let inner = self.inner.lock();
        (inner.session.clone(), inner.epoch)
    }

    /// Replace the session. On a store failure nothing changes.
    pub fn set(&self, session: Session) -> Result<()> {
        let generation = {
            let mut inner = self.inner.lock();
            self.store.save(&session)?;
            inner.session = Some(session.clone());
            inner.generation += 1;
            inner.epoch += 1;
            inner.generation
        };
        self.notify(generation, Some(session));
        Ok(())
    }

    /// Drop the session. Memory is always cleared; the store error, if
    /// any, is returned afterwards.
    pub fn reset(&self) -> Result<()> {
        let (cleared, generation, result) = {
            let mut inner = self.inner.lock();
            let had_session = inner.session.take().is_some();
            inner.generation += 1;
            inner.epoch += 1;
            (had_session, inner.generation, self.store.clear())
        };
        if cleared {
            self.notify(generation, None);
        }
        result
    }

    /// Drop the session only if it is still the one from `generation`.
    pub fn reset_if(&self, generation: u64) -> Result<bool> {
        let (current, result) = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return Ok(false);
            }
            inner.session = None;
            inner.generation += 1;
            inner.epoch += 1;
            (inner.generation, self.store.clear())
        };
        self.notify(current, None);
        result.map(|_| true)
    }

    /// Install a refreshed access token into the session from `generation`.
    ///
    /// Returns the updated session, or `None` if the session changed or
    /// vanished since the refresh started.
    pub fn apply_refresh(&self, generation: u64, grant: RefreshGrant) -> Result<Option<Session>> {
        let (updated, current) = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return Ok(None);
            }
            let Some(current) = inner.session.as_ref() else {
                return Ok(None);
            };

            let mut updated = current.clone();
            let now = Utc::now();
            updated.access_token = grant.access_token;
            if let Some(rotated) = grant.refresh_token {
                updated.refresh_token = Some(rotated);
            }
            updated.expires_at = expiry_from(now, grant.expires_in);

            self.store.save(&updated)?;
            inner.session = Some(updated.clone());
            inner.generation += 1;
            (updated, inner.generation)
        };
        self.notify(current, Some(updated.clone()));
        Ok(Some(updated))
    }

    /// Watch channel carrying the latest session.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.changes.subscribe()
    }

    pub fn on_change(&self, listener: SessionListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Deliver the change made at `generation`, unless a newer one has
    /// already been delivered.
    fn notify(&self, generation: u64, session: Option<Session>) {
        // Held across delivery. Reentrant so a listener may change the
        // session itself; `inner` is never held here.
        let delivered = self.delivered.lock();
        if generation <= delivered.get() {
            tracing::debug!(generation, "Dropping overtaken session change");
            return;
        }
        delivered.set(generation);
        self.changes.send_replace(session.clone());

        let listeners: Vec<SessionListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            if delivered.get() != generation {
                break;
            }
            listener(session.as_ref());
        }
    }
}
