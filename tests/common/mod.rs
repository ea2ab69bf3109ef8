#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{StatusCode, header::AUTHORIZATION};
use serde_json::{Value, json};
use tokio::sync::Notify;

use tunelink::{
    Result, SessionError,
    client::{ApiClient, Transport},
    management::MemoryCredentialStore,
    session::SessionManager,
    spotify::AuthBackend,
    types::{ApiRequest, ApiResponse, RefreshGrant, TokenGrant, UserProfile},
};

/// Backend fake: one code grant, one refresh answer, one profile.
#[derive(Debug)]
pub struct FakeBackend {
    pub grant: Mutex<Result<TokenGrant>>,
    pub refresh_result: Mutex<Result<RefreshGrant>>,
    pub profile: Mutex<Result<UserProfile>>,
    pub refresh_calls: AtomicUsize,
    pub refresh_tokens_seen: Mutex<Vec<String>>,
    /// When set, every refresh waits for a permit before answering.
    pub refresh_gate: Option<Arc<Notify>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        FakeBackend {
            grant: Mutex::new(Ok(grant("A1", Some("R1"), json!({"id": "u1"})))),
            refresh_result: Mutex::new(Ok(RefreshGrant {
                access_token: "A2".to_string(),
                refresh_token: None,
                expires_in: None,
            })),
            profile: Mutex::new(Ok(UserProfile::new(json!({"id": "u1"})))),
            refresh_calls: AtomicUsize::new(0),
            refresh_tokens_seen: Mutex::new(Vec::new()),
            refresh_gate: None,
        }
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        FakeBackend {
            refresh_gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn reject_refresh(&self) {
        *self.refresh_result.lock() = Err(SessionError::Backend {
            status: 400,
            message: "invalid_grant".to_string(),
        });
    }
}

pub fn grant(access: &str, refresh: Option<&str>, user: Value) -> TokenGrant {
    TokenGrant {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        expires_in: None,
        user: UserProfile::new(user),
    }
}

#[async_trait]
impl AuthBackend for FakeBackend {
    async fn exchange_code(&self, _code: &str) -> Result<TokenGrant> {
        self.grant.lock().clone()
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_tokens_seen
            .lock()
            .push(refresh_token.to_string());
        if let Some(gate) = &self.refresh_gate {
            gate.notified().await;
        }
        self.refresh_result.lock().clone()
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile> {
        if access_token.is_empty() {
            return Err(SessionError::Backend {
                status: 401,
                message: "no token".to_string(),
            });
        }
        self.profile.lock().clone()
    }
}

/// What the fake transport saw for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub path: String,
    pub authorization: Option<String>,
    pub retried: bool,
}

/// Transport fake: answers 200 to the accepted token, 401 to anything else.
#[derive(Debug)]
pub struct FakeTransport {
    pub accepted_token: Mutex<Option<String>>,
    pub seen: Mutex<Vec<Seen>>,
    pub unauthorized: AtomicUsize,
    pub fail_with: Mutex<Option<SessionError>>,
}

impl FakeTransport {
    pub fn accepting(token: &str) -> Self {
        FakeTransport {
            accepted_token: Mutex::new(Some(token.to_string())),
            seen: Mutex::new(Vec::new()),
            unauthorized: AtomicUsize::new(0),
            fail_with: Mutex::new(None),
        }
    }

    pub fn rejecting_all() -> Self {
        FakeTransport {
            accepted_token: Mutex::new(None),
            ..Self::accepting("")
        }
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().clone()
    }

    pub fn unauthorized_count(&self) -> usize {
        self.unauthorized.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        if let Some(e) = self.fail_with.lock().clone() {
            return Err(e);
        }

        let authorization = request
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.seen.lock().push(Seen {
            path: request.path.clone(),
            authorization: authorization.clone(),
            retried: request.is_retry(),
        });

        let accepted = self
            .accepted_token
            .lock()
            .as_ref()
            .map(|token| format!("Bearer {}", token));
        if accepted.is_some() && authorization == accepted {
            Ok(ApiResponse::new(
                StatusCode::OK,
                serde_json::to_vec(&json!({"path": request.path})).unwrap_or_default(),
            ))
        } else {
            self.unauthorized.fetch_add(1, Ordering::SeqCst);
            Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, b"expired".to_vec()))
        }
    }
}

pub struct Harness {
    pub store: Arc<MemoryCredentialStore>,
    pub backend: Arc<FakeBackend>,
    pub transport: Arc<FakeTransport>,
    pub manager: SessionManager,
    pub client: ApiClient,
}

pub fn harness(backend: FakeBackend, transport: FakeTransport) -> Harness {
    let store = Arc::new(MemoryCredentialStore::new());
    let backend = Arc::new(backend);
    let transport = Arc::new(transport);
    let manager = SessionManager::restore(store.clone(), backend.clone());
    let client = ApiClient::new(manager.clone(), transport.clone());
    Harness {
        store,
        backend,
        transport,
        manager,
        client,
    }
}

/// Yield until `count` returns at least `target`, then release `gate`.
pub async fn release_when(gate: &Notify, target: usize, count: impl Fn() -> usize) {
    while count() < target {
        tokio::task::yield_now().await;
    }
    gate.notify_one();
}
