pub mod credentials;
pub mod manager;
pub mod password;
pub mod session;

pub use credentials::{CredentialRecord, CredentialStore, RestCredentialStore};
pub use manager::SessionManager;
pub use session::{
    LocalSession, SessionSnapshot, SessionState, SESSION_LIFETIME_MS, SESSION_STORAGE_KEY,
};
