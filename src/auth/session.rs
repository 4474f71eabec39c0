use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const SESSION_LIFETIME_MS: i64 = 24 * 60 * 60 * 1000;

pub const SESSION_STORAGE_KEY: &str = "projectmap.user_session";

/// Locally persisted proof that a regular user passed the credential check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalSession {
    pub username: String,
    pub established_at_ms: i64,
}

impl LocalSession {
    pub fn establish(username: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            username: username.into(),
            established_at_ms: now.timestamp_millis(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let session: LocalSession = serde_json::from_str(raw)
            .map_err(|err| AppError::StorageCorruption(err.to_string()))?;
        if session.username.is_empty() {
            return Err(AppError::StorageCorruption("empty username".into()));
        }
        Ok(session)
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({
            "username": self.username,
            "establishedAtMs": self.established_at_ms,
        })
        .to_string()
    }

    pub fn established_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.established_at_ms).single()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis().saturating_sub(self.established_at_ms) >= SESSION_LIFETIME_MS
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated {
        username: String,
    },
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            SessionState::Authenticated { username } => Some(username),
            SessionState::Unauthenticated => None,
        }
    }
}

/// What the UI layer reads.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub is_user_authenticated: bool,
    pub username: Option<String>,
}

impl From<&SessionState> for SessionSnapshot {
    fn from(state: &SessionState) -> Self {
        Self {
            is_user_authenticated: state.is_authenticated(),
            username: state.username().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn expiry_boundary_is_exactly_24_hours() {
        let now = Utc::now();
        let session = |age: Duration| LocalSession::establish("alice", now - age);

        assert!(!session(Duration::hours(1)).is_expired_at(now));
        assert!(!session(Duration::milliseconds(SESSION_LIFETIME_MS - 1)).is_expired_at(now));
        assert!(session(Duration::milliseconds(SESSION_LIFETIME_MS)).is_expired_at(now));
        assert!(session(Duration::hours(25)).is_expired_at(now));
    }

    #[test]
    fn json_shape_is_stable() {
        let session = LocalSession {
            username: "alice".into(),
            established_at_ms: 1_700_000_000_000,
        };

        let raw = session.to_json();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&raw).unwrap(),
            serde_json::json!({ "username": "alice", "establishedAtMs": 1_700_000_000_000i64 })
        );
        assert_eq!(LocalSession::from_json(&raw).unwrap(), session);
    }

    #[test]
    fn malformed_records_are_storage_corruption() {
        for raw in [
            "{",
            "null",
            r#"{"username":"alice"}"#,
            r#"{"username":"","establishedAtMs":1}"#,
            r#"{"username":"alice","establishedAtMs":"yesterday"}"#,
        ] {
            assert!(
                matches!(LocalSession::from_json(raw), Err(AppError::StorageCorruption(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn snapshot_mirrors_state() {
        let snapshot = SessionSnapshot::from(&SessionState::Authenticated {
            username: "bob".into(),
        });
        assert!(snapshot.is_user_authenticated);
        assert_eq!(snapshot.username.as_deref(), Some("bob"));

        let snapshot = SessionSnapshot::from(&SessionState::Unauthenticated);
        assert!(!snapshot.is_user_authenticated);
        assert!(snapshot.username.is_none());
    }
}
