use async_trait::async_trait;
use log::debug;
use reqwest::{header, Client};
use serde::Deserialize;

use crate::{error::AppError, settings::CredentialSettings};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CredentialRecord {
    pub username: String,
    pub password_hash: String,
}

/// Keyed read-only lookup into the remote credential table.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<CredentialRecord>, AppError>;
}

/// Credential table exposed through the managed backend's REST interface.
pub struct RestCredentialStore {
    client: Client,
    base_url: String,
    table: String,
    api_key: String,
}

impl RestCredentialStore {
    pub fn new(settings: &CredentialSettings) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(client: Client, settings: &CredentialSettings) -> Self {
        Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            table: settings.table.clone(),
            api_key: settings.api_key.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }
}

#[async_trait]
impl CredentialStore for RestCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<CredentialRecord>, AppError> {
        if self.base_url.is_empty() {
            return Err(AppError::LookupFailure(
                "credential store URL is not configured".into(),
            ));
        }

        debug!("Looking up credential record for '{username}'");

        let response = self
            .client
            .get(self.endpoint())
            .query(&[
                ("select", "username,password_hash".to_string()),
                ("username", format!("eq.{username}")),
                ("limit", "1".to_string()),
            ])
            .header("apikey", &self.api_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| AppError::LookupFailure(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::LookupFailure(format!(
                "credential store answered {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|err| AppError::LookupFailure(err.to_string()))?;
        let rows: Vec<CredentialRecord> =
            serde_json::from_str(&body).map_err(|err| AppError::parse("credential rows", err))?;

        Ok(rows.into_iter().find(|row| row.username == username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::source::test_server::serve_once;

    fn store_for(base_url: String) -> RestCredentialStore {
        let settings = CredentialSettings {
            base_url,
            api_key: "anon-key".into(),
            ..CredentialSettings::default()
        };
        let client = Client::builder().no_proxy().build().unwrap();
        RestCredentialStore::with_client(client, &settings)
    }

    #[tokio::test]
    async fn finds_exact_username() {
        let (base, request_rx) = serve_once(
            "200 OK",
            r#"[{"username":"alice","password_hash":"sha256$1$00$00"}]"#,
        )
        .await;
        let store = store_for(format!("{base}/"));

        let record = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(record.username, "alice");

        let request = request_rx.await.unwrap();
        assert!(request.starts_with("GET /rest/v1/app_users?"));
        assert!(request.contains("username=eq.alice"));
        assert!(request.to_ascii_lowercase().contains("apikey: anon-key"));
    }

    #[tokio::test]
    async fn case_mismatch_is_not_a_match() {
        let (base, _request_rx) = serve_once(
            "200 OK",
            r#"[{"username":"Alice","password_hash":"sha256$1$00$00"}]"#,
        )
        .await;
        let store = store_for(base);

        assert!(store.find_by_username("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_result_is_none() {
        let (base, _request_rx) = serve_once("200 OK", "[]").await;
        let store = store_for(base);

        assert!(store.find_by_username("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn server_error_is_lookup_failure() {
        let (base, _request_rx) = serve_once("500 Internal Server Error", "{}").await;
        let store = store_for(base);

        let err = store.find_by_username("alice").await.unwrap_err();
        assert!(matches!(err, AppError::LookupFailure(_)));
    }

    #[tokio::test]
    async fn unconfigured_store_fails_without_network() {
        let store = store_for(String::new());

        let err = store.find_by_username("alice").await.unwrap_err();
        assert!(matches!(err, AppError::LookupFailure(_)));
    }
}
