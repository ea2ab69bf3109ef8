use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{
    error::{Result, SessionError},
    types::{Session, UserProfile},
};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_KEY: &str = "user";
pub const ISSUED_AT_KEY: &str = "issuedAt";
pub const EXPIRES_AT_KEY: &str = "expiresAt";

/// Every key a session may occupy. All of them are written and cleared together.
pub const SESSION_KEYS: [&str; 5] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    USER_KEY,
    ISSUED_AT_KEY,
    EXPIRES_AT_KEY,
];

/// Default session file name within the tunelink data directory.
pub const SESSION_FILE: &str = "session.json";

/// Outcome of reading the persisted session.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    Missing,
    Found(Session),
    /// Something is stored but it does not decode into a session.
    Corrupt(String),
}

/// Durable storage for the session across restarts.
///
/// `save` must be atomic from the caller's point of view and `load` must
/// never fail: data that does not decode is reported as [`Loaded::Corrupt`]
/// so the caller can clear it, while storage that cannot be read at all is
/// reported as [`Loaded::Missing`].
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
    fn save(&self, session: &Session) -> Result<()>;

    fn load(&self) -> Loaded;

    fn clear(&self) -> Result<()>;
}

fn encode_entries(session: &Session) -> Result<BTreeMap<String, String>> {
    let mut entries = BTreeMap::new();
    entries.insert(ACCESS_TOKEN_KEY.to_string(), session.access_token.clone());
    if let Some(refresh_token) = &session.refresh_token {
        entries.insert(REFRESH_TOKEN_KEY.to_string(), refresh_token.clone());
    }
    entries.insert(USER_KEY.to_string(), serde_json::to_string(&session.user)?);
    entries.insert(ISSUED_AT_KEY.to_string(), session.issued_at.to_rfc3339());
    if let Some(expires_at) = session.expires_at {
        entries.insert(EXPIRES_AT_KEY.to_string(), expires_at.to_rfc3339());
    }
    Ok(entries)
}

fn parse_timestamp(key: &str, raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid {key}: {e}"))
}

fn decode_entries(entries: &BTreeMap<String, String>) -> Loaded {
    let access_token = entries.get(ACCESS_TOKEN_KEY);
    let user = entries.get(USER_KEY);

    let (access_token, user) = match (access_token, user) {
        (None, None) => {
            return match SESSION_KEYS.iter().find(|key| entries.contains_key(**key)) {
                Some(key) => Loaded::Corrupt(format!("{key} without {ACCESS_TOKEN_KEY}")),
                None => Loaded::Missing,
            };
        }
        (Some(token), Some(user)) => (token, user),
        (None, Some(_)) => return Loaded::Corrupt(format!("{ACCESS_TOKEN_KEY} is missing")),
        (Some(_), None) => return Loaded::Corrupt(format!("{USER_KEY} is missing")),
    };

    if access_token.is_empty() {
        return Loaded::Corrupt(format!("{ACCESS_TOKEN_KEY} is empty"));
    }

    let user: UserProfile = match serde_json::from_str(user) {
        Ok(user) => user,
        Err(e) => return Loaded::Corrupt(format!("invalid {USER_KEY}: {e}")),
    };

    // Sessions written without a timestamp are treated as issued now.
    let issued_at = match entries.get(ISSUED_AT_KEY) {
        Some(raw) => match parse_timestamp(ISSUED_AT_KEY, raw) {
            Ok(dt) => dt,
            Err(e) => return Loaded::Corrupt(e),
        },
        None => Utc::now(),
    };

    let expires_at = match entries.get(EXPIRES_AT_KEY) {
        Some(raw) => match parse_timestamp(EXPIRES_AT_KEY, raw) {
            Ok(dt) => Some(dt),
            Err(e) => return Loaded::Corrupt(e),
        },
        None => None,
    };

    Loaded::Found(Session {
        access_token: access_token.clone(),
        refresh_token: entries.get(REFRESH_TOKEN_KEY).cloned(),
        user,
        issued_at,
        expires_at,
    })
}

// ============================================================================
// FileCredentialStore
// ============================================================================

/// File-based store keeping the session keys in one JSON object.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Create a store writing [`SESSION_FILE`] inside `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE),
        }
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CredentialStore for FileCredentialStore {
    fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SessionError::Storage(format!("Failed to create session directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(&encode_entries(session)?)?;

        // Write aside and rename so a reader never sees a half-written file.
        let staging = self.staging_path();
        fs::write(&staging, json)
            .map_err(|e| SessionError::Storage(format!("Failed to write session file: {}", e)))?;
        fs::rename(&staging, &self.path)
            .map_err(|e| SessionError::Storage(format!("Failed to replace session file: {}", e)))?;

        tracing::debug!("Session saved to {}", self.path.display());
        Ok(())
    }

    fn load(&self) -> Loaded {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Loaded::Missing,
            // Unreadable is not corrupt; leave the file for a later run.
            Err(e) => {
                tracing::warn!("Failed to read session file {}: {}", self.path.display(), e);
                return Loaded::Missing;
            }
        };

        match serde_json::from_str::<BTreeMap<String, String>>(&content) {
            Ok(entries) => decode_entries(&entries),
            Err(e) => Loaded::Corrupt(format!("Failed to parse session file: {}", e)),
        }
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Storage(format!(
                "Failed to delete session file: {}",
                e
            ))),
        }
    }
}

// ============================================================================
// MemoryCredentialStore
// ============================================================================

/// In-memory store with the same key layout as the file store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<BTreeMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently present, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    /// Store a raw value, bypassing encoding.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
    }

    /// Make every following `save`/`clear` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SessionError::Storage("store is read-only".to_string()));
        }
        Ok(())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&self, session: &Session) -> Result<()> {
        self.check_writable()?;
        let encoded = encode_entries(session)?;
        let mut entries = self.entries.lock();
        for key in SESSION_KEYS {
            entries.remove(key);
        }
        entries.extend(encoded);
        Ok(())
    }

    fn load(&self) -> Loaded {
        decode_entries(&self.entries.lock())
    }

    fn clear(&self) -> Result<()> {
        self.check_writable()?;
        let mut entries = self.entries.lock();
        for key in SESSION_KEYS {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn session(refresh: Option<&str>) -> Session {
        Session::new(
            "access".to_string(),
            refresh.map(str::to_string),
            UserProfile::new(json!({"id": "u1", "display_name": "Una"})),
        )
    }

    #[test]
    fn test_file_save_and_load() {
        let temp = tempdir().unwrap();
        let store = FileCredentialStore::new(temp.path());
        assert_eq!(store.load(), Loaded::Missing);

        let original = session(Some("refresh"));
        store.save(&original).unwrap();

        match store.load() {
            Loaded::Found(loaded) => assert_eq!(loaded, original),
            other => panic!("unexpected load result: {:?}", other),
        }
    }

    #[test]
    fn test_file_layout_uses_session_keys() {
        let temp = tempdir().unwrap();
        let store = FileCredentialStore::new(temp.path());
        store.save(&session(None)).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let entries: BTreeMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert!(entries.contains_key(ACCESS_TOKEN_KEY));
        assert!(entries.contains_key(USER_KEY));
        assert!(!entries.contains_key(REFRESH_TOKEN_KEY));

        let user: serde_json::Value = serde_json::from_str(&entries[USER_KEY]).unwrap();
        assert_eq!(user["id"], "u1");
        assert!(!store.staging_path().exists());
    }

    #[test]
    fn test_file_corrupt_is_reported() {
        let temp = tempdir().unwrap();
        let store = FileCredentialStore::new(temp.path());
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(matches!(store.load(), Loaded::Corrupt(_)));
    }

    #[test]
    fn test_file_clear_is_idempotent() {
        let temp = tempdir().unwrap();
        let store = FileCredentialStore::new(temp.path());
        store.save(&session(Some("r"))).unwrap();

        store.clear().unwrap();
        assert!(!store.path().exists());
        store.clear().unwrap();
        assert_eq!(store.load(), Loaded::Missing);
    }

    #[test]
    fn test_memory_user_not_json_is_corrupt() {
        let store = MemoryCredentialStore::new();
        store.insert_raw(ACCESS_TOKEN_KEY, "a");
        store.insert_raw(USER_KEY, "{broken");

        assert!(matches!(store.load(), Loaded::Corrupt(_)));
    }

    #[test]
    fn test_memory_partial_session_is_corrupt() {
        let store = MemoryCredentialStore::new();
        store.insert_raw(ACCESS_TOKEN_KEY, "a");

        assert!(matches!(store.load(), Loaded::Corrupt(_)));
    }

    #[test]
    fn test_file_unreadable_is_missing_and_kept() {
        let temp = tempdir().unwrap();
        let store = FileCredentialStore::new(temp.path());
        std::fs::create_dir(store.path()).unwrap();

        assert_eq!(store.load(), Loaded::Missing);
        assert!(store.path().is_dir());
    }

    #[test]
    fn test_memory_orphaned_refresh_token_is_corrupt() {
        let store = MemoryCredentialStore::new();
        store.insert_raw(REFRESH_TOKEN_KEY, "r1");

        assert!(matches!(store.load(), Loaded::Corrupt(_)));
    }

    #[test]
    fn test_memory_save_replaces_previous_refresh_token() {
        let store = MemoryCredentialStore::new();
        store.save(&session(Some("r1"))).unwrap();
        store.save(&session(None)).unwrap();

        assert_eq!(store.get_raw(REFRESH_TOKEN_KEY), None);
        assert_eq!(store.get_raw(ACCESS_TOKEN_KEY).as_deref(), Some("access"));
    }

    #[test]
    fn test_memory_clear_keeps_foreign_keys() {
        let store = MemoryCredentialStore::new();
        store.insert_raw("theme", "dark");
        store.save(&session(Some("r"))).unwrap();

        store.clear().unwrap();
        assert_eq!(store.keys(), vec!["theme".to_string()]);
    }

    #[test]
    fn test_memory_fail_writes() {
        let store = MemoryCredentialStore::new();
        store.set_fail_writes(true);

        assert!(matches!(
            store.save(&session(None)),
            Err(SessionError::Storage(_))
        ));
        assert_eq!(store.load(), Loaded::Missing);
    }
}
