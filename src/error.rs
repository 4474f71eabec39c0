use thiserror::Error;

/// Failures the update gate and session manager can hit.
///
/// None of these leave their component: the gate degrades to "no update"
/// and the session manager to `false` / `Unauthenticated`. They exist so the
/// log line says what actually went wrong.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("failed to parse {what}: {source}")]
    ParseFailure {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("credential lookup failed: {0}")]
    LookupFailure(String),

    #[error("credentials did not match for user '{0}'")]
    CredentialMismatch(String),

    #[error("persisted session is unreadable: {0}")]
    StorageCorruption(String),

    #[error("local storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl AppError {
    pub fn parse(what: &'static str, source: serde_json::Error) -> Self {
        AppError::ParseFailure { what, source }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::NetworkFailure(err.to_string())
    }
}
