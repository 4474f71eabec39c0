use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Remote release document. Only `versionCode` is authoritative; the rest
/// is shown to the user as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    #[serde(rename = "latestVersion", default)]
    pub latest_version_label: String,
    pub version_code: u64,
    #[serde(default)]
    pub changelog: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub is_critical: bool,
}

impl VersionDescriptor {
    pub fn from_json(body: &str) -> Result<Self, AppError> {
        serde_json::from_str(body).map_err(|err| AppError::parse("version descriptor", err))
    }

    pub fn is_newer_than(&self, version_code: u64) -> bool {
        self.version_code > version_code
    }
}
