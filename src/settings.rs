use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard},
    time::Duration,
};

use crate::platform::Platform;

pub const DEFAULT_VERSION_URL: &str = "https://projectmap.app/version.json";
pub const DEFAULT_CREDENTIALS_TABLE: &str = "app_users";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateSettings {
    pub descriptor_url: String,
    pub grace_period_ms: u64,
    pub request_timeout_ms: u64,
    pub target_platforms: Vec<Platform>,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            descriptor_url: DEFAULT_VERSION_URL.into(),
            grace_period_ms: 3_000,
            request_timeout_ms: 10_000,
            target_platforms: vec![Platform::Android, Platform::Ios],
        }
    }
}

impl UpdateSettings {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CredentialSettings {
    pub base_url: String,
    pub table: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            table: DEFAULT_CREDENTIALS_TABLE.into(),
            api_key: String::new(),
            request_timeout_ms: 10_000,
        }
    }
}

impl CredentialSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
struct AppSettings {
    update: UpdateSettings,
    credentials: CredentialSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<AppSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data: AppSettings = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring malformed settings at {}: {err}", path.display());
                AppSettings::default()
            })
        } else {
            let defaults = AppSettings::default();
            persist(&path, &defaults)?;
            defaults
        };
        drop_web_targets(&mut data.update);

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn update(&self) -> UpdateSettings {
        self.effective().update
    }

    pub fn credentials(&self) -> CredentialSettings {
        self.effective().credentials
    }

    /// Replaces the update section on disk. Environment overrides still win
    /// on the next read and are never written back.
    pub fn set_update(&self, mut settings: UpdateSettings) -> Result<()> {
        drop_web_targets(&mut settings);
        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.update = settings;
        persist(&self.path, &guard)
    }

    fn effective(&self) -> AppSettings {
        let mut data = self.read().clone();
        apply_env_overrides(&mut data);
        data
    }

    fn read(&self) -> RwLockReadGuard<'_, AppSettings> {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn persist(path: &Path, data: &AppSettings) -> Result<()> {
    let serialized = serde_json::to_string_pretty(data)?;
    fs::write(path, serialized)
        .with_context(|| format!("Failed to write settings to {}", path.display()))
}

fn drop_web_targets(update: &mut UpdateSettings) {
    update.target_platforms.retain(|platform| {
        if platform.is_native() {
            true
        } else {
            warn!("Update checks are never run on {platform}; ignoring it in targetPlatforms");
            false
        }
    });
}

fn apply_env_overrides(data: &mut AppSettings) {
    if let Ok(url) = env::var("PROJECTMAP_VERSION_URL") {
        data.update.descriptor_url = url;
    }
    if let Ok(raw) = env::var("PROJECTMAP_UPDATE_DELAY_MS") {
        match raw.parse() {
            Ok(ms) => data.update.grace_period_ms = ms,
            Err(err) => warn!("Ignoring PROJECTMAP_UPDATE_DELAY_MS='{raw}': {err}"),
        }
    }
    if let Ok(url) = env::var("PROJECTMAP_CREDENTIALS_URL") {
        data.credentials.base_url = url;
    }
    if let Ok(key) = env::var("PROJECTMAP_CREDENTIALS_KEY") {
        data.credentials.api_key = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();

        assert!(path.exists());
        assert_eq!(store.update().grace_period_ms, 3_000);
        assert_eq!(store.credentials().table, DEFAULT_CREDENTIALS_TABLE);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "update": { "gracePeriodMs": 500, "targetPlatforms": ["android", "web"] } }"#,
        )
        .unwrap();

        let store = SettingsStore::new(path).unwrap();
        let update = store.update();

        assert_eq!(update.grace_period_ms, 500);
        assert_eq!(update.request_timeout_ms, 10_000);
        assert_eq!(update.target_platforms, vec![Platform::Android]);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();

        assert_eq!(store.update().target_platforms.len(), 2);
    }

    #[test]
    fn set_update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut update = store.update();
        update.grace_period_ms = 42;
        store.set_update(update).unwrap();

        let reloaded = SettingsStore::new(path).unwrap();
        assert_eq!(reloaded.update().grace_period_ms, 42);
    }

    #[test]
    fn web_targets_are_dropped_when_loaded_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "update": { "targetPlatforms": ["web", "ios"] } }"#,
        )
        .unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.read().update.target_platforms, vec![Platform::Ios]);

        let mut update = store.update();
        update.target_platforms = vec![Platform::Web, Platform::Desktop];
        store.set_update(update).unwrap();
        assert_eq!(store.read().update.target_platforms, vec![Platform::Desktop]);
    }
}
