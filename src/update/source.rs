use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{header, Client};

use crate::error::AppError;

use super::VersionDescriptor;

/// Where the latest release descriptor comes from.
#[async_trait]
pub trait VersionSource: Send + Sync {
    async fn fetch_descriptor(&self) -> Result<VersionDescriptor, AppError>;
}

/// Fetches the descriptor as a static JSON document, bypassing caches.
pub struct HttpVersionSource {
    client: Client,
    url: String,
}

impl HttpVersionSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl VersionSource for HttpVersionSource {
    async fn fetch_descriptor(&self) -> Result<VersionDescriptor, AppError> {
        debug!("Fetching version descriptor from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .header(header::CACHE_CONTROL, "no-store")
            .header(header::PRAGMA, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::NetworkFailure(format!(
                "{} answered {status}",
                self.url
            )));
        }

        let body = response.text().await?;
        VersionDescriptor::from_json(&body)
    }
}
