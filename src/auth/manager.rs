use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::{error::AppError, storage::KeyValueStore};

use super::{
    credentials::CredentialStore,
    password::verify_password,
    session::{LocalSession, SessionSnapshot, SessionState, SESSION_STORAGE_KEY},
};

/// Backend-independent login gate for regular (non-admin) users.
///
/// The in-memory [`SessionState`] is only changed by `login`, `logout` and
/// `restore_session`; everything else reads it. Expiry is checked lazily on
/// restore, never by a background timer.
#[derive(Clone)]
pub struct SessionManager {
    state: Arc<RwLock<SessionState>>,
    credentials: Arc<dyn CredentialStore>,
    storage: Arc<dyn KeyValueStore>,
    cancel_token: CancellationToken,
}

impl SessionManager {
    pub fn new(credentials: Arc<dyn CredentialStore>, storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::Unauthenticated)),
            credentials,
            storage,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.read_state().clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::from(&*self.read_state())
    }

    pub fn is_user_authenticated(&self) -> bool {
        self.read_state().is_authenticated()
    }

    pub fn username(&self) -> Option<String> {
        self.read_state().username().map(str::to_string)
    }

    /// Checks the credentials and, on success, persists a fresh session.
    /// Any failure leaves the current state and stored record untouched.
    pub async fn login(&self, username: &str, password: &str) -> bool {
        match self.try_login(username, password).await {
            Ok(session) => {
                info!("User '{}' logged in", session.username);
                true
            }
            Err(AppError::CredentialMismatch(user)) => {
                info!("Rejected login for '{user}': invalid credentials");
                false
            }
            Err(AppError::Cancelled) => {
                debug!("Discarding login for '{username}' after shutdown");
                false
            }
            Err(err) => {
                warn!("Login for '{username}' failed: {err}");
                false
            }
        }
    }

    async fn try_login(&self, username: &str, password: &str) -> Result<LocalSession, AppError> {
        let lookup = tokio::select! {
            result = self.credentials.find_by_username(username) => result,
            _ = self.cancel_token.cancelled() => return Err(AppError::Cancelled),
        };

        let record = lookup?.ok_or_else(|| {
            AppError::LookupFailure(format!("no credential record for '{username}'"))
        })?;

        let verification = tokio::task::spawn_blocking({
            let password = password.to_string();
            let reference = record.password_hash.clone();
            move || verify_password(&password, &reference)
        });
        let verified = tokio::select! {
            joined = verification => joined.map_err(|err| {
                AppError::LookupFailure(format!("password check worker failed: {err}"))
            })?,
            _ = self.cancel_token.cancelled() => return Err(AppError::Cancelled),
        };
        if !verified {
            return Err(AppError::CredentialMismatch(username.to_string()));
        }

        if self.cancel_token.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let session = LocalSession::establish(record.username, Utc::now());
        self.storage
            .set(SESSION_STORAGE_KEY, &session.to_json())
            .await?;

        *self.write_state() = SessionState::Authenticated {
            username: session.username.clone(),
        };

        Ok(session)
    }

    /// Decides the startup state from the persisted record. Expired or
    /// unreadable records are deleted.
    pub async fn restore_session(&self) -> SessionState {
        let restored = match self.load_persisted().await {
            Ok(Some(session)) if session.is_expired_at(Utc::now()) => {
                info!(
                    "Session for '{}' established at {} has expired",
                    session.username,
                    session
                        .established_at()
                        .map(|at| at.to_rfc3339())
                        .unwrap_or_else(|| session.established_at_ms.to_string())
                );
                self.discard_persisted().await;
                SessionState::Unauthenticated
            }
            Ok(Some(session)) => {
                info!("Restored session for '{}'", session.username);
                SessionState::Authenticated {
                    username: session.username,
                }
            }
            Ok(None) => SessionState::Unauthenticated,
            Err(err @ AppError::StorageCorruption(_)) => {
                warn!("Discarding persisted session: {err}");
                self.discard_persisted().await;
                SessionState::Unauthenticated
            }
            Err(err) => {
                error!("Could not read persisted session: {err}");
                SessionState::Unauthenticated
            }
        };

        *self.write_state() = restored.clone();
        restored
    }

    /// Clears the session. Safe to call when nobody is logged in.
    pub async fn logout(&self) {
        let previous = std::mem::take(&mut *self.write_state());
        if let Some(username) = previous.username() {
            info!("User '{username}' logged out");
        }
        self.discard_persisted().await;
    }

    /// Makes any in-flight login resolve to `false` without touching state.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    async fn load_persisted(&self) -> Result<Option<LocalSession>, AppError> {
        let raw = self.storage.get(SESSION_STORAGE_KEY).await?;
        raw.as_deref().map(LocalSession::from_json).transpose()
    }

    async fn discard_persisted(&self) {
        if let Err(err) = self.storage.remove(SESSION_STORAGE_KEY).await {
            error!("Failed to remove persisted session: {err:#}");
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
