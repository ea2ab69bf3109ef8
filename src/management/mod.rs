mod state;
mod store;

pub use state::ListenerId;
pub use state::SessionListener;
pub use state::SessionState;
pub use store::CredentialStore;
pub use store::FileCredentialStore;
pub use store::Loaded;
pub use store::MemoryCredentialStore;
pub use store::{
    ACCESS_TOKEN_KEY, EXPIRES_AT_KEY, ISSUED_AT_KEY, REFRESH_TOKEN_KEY, SESSION_FILE,
    SESSION_KEYS, USER_KEY,
};
