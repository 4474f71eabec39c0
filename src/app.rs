use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::sync::Mutex;

use crate::{
    auth::{RestCredentialStore, SessionManager},
    db::Database,
    platform::Platform,
    settings::SettingsStore,
    storage::{KeyValueStore, MemoryKeyValueStore},
    update::{
        HttpVersionSource, UpdateCheckOptions, UpdateGate, VersionSource, CURRENT_VERSION_CODE,
        CURRENT_VERSION_LABEL,
    },
};

pub const DATABASE_FILE: &str = "projectmap.sqlite3";
pub const SETTINGS_FILE: &str = "settings.json";

/// Everything the UI layer talks to, wired up once per launch.
pub struct AppServices {
    pub settings: SettingsStore,
    pub sessions: SessionManager,
    pub update_gate: Mutex<UpdateGate>,
    pub platform: Platform,
}

impl AppServices {
    /// Loads settings, opens local storage, restores the user session and
    /// kicks off the update check. Must run inside a tokio runtime.
    pub async fn initialize(data_dir: &Path, platform: Platform) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;

        let storage: Arc<dyn KeyValueStore> = match Database::new(data_dir.join(DATABASE_FILE)) {
            Ok(db) => Arc::new(db),
            Err(err) => {
                warn!("Local database unavailable, sessions will not survive restart: {err:#}");
                Arc::new(MemoryKeyValueStore::new())
            }
        };

        let credentials = RestCredentialStore::new(&settings.credentials())
            .context("failed to build credential store client")?;
        let sessions = SessionManager::new(Arc::new(credentials), storage);
        sessions.restore_session().await;

        let update = settings.update();
        let source: Arc<dyn VersionSource> = Arc::new(
            HttpVersionSource::new(update.descriptor_url.clone(), update.request_timeout())
                .context("failed to build version source client")?,
        );
        let options = UpdateCheckOptions {
            platform,
            target_platforms: update.target_platforms.clone(),
            current_version_code: CURRENT_VERSION_CODE,
            grace_period: update.grace_period(),
        };
        let update_gate = UpdateGate::spawn(source, options);

        info!(
            "Services ready on {platform} (build {CURRENT_VERSION_LABEL}, code {CURRENT_VERSION_CODE})"
        );

        Ok(Self {
            settings,
            sessions,
            update_gate: Mutex::new(update_gate),
            platform,
        })
    }

    pub async fn shutdown(&self) {
        self.sessions.shutdown();

        let mut gate = self.update_gate.lock().await;
        if gate.is_running() {
            info!("Stopping pending update check");
            gate.teardown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{LocalSession, SESSION_STORAGE_KEY};

    #[tokio::test]
    async fn restores_persisted_session_on_start() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = Database::new(dir.path().join(DATABASE_FILE)).unwrap();
            let session = LocalSession::establish("maria", chrono::Utc::now());
            db.set(SESSION_STORAGE_KEY, &session.to_json()).await.unwrap();
        }

        let services = AppServices::initialize(dir.path(), Platform::Web).await.unwrap();

        assert_eq!(services.sessions.username().as_deref(), Some("maria"));
        assert!(dir.path().join(SETTINGS_FILE).exists());
        services.shutdown().await;
    }

    #[tokio::test]
    async fn web_launch_never_schedules_a_check() {
        let dir = tempfile::tempdir().unwrap();

        let services = AppServices::initialize(dir.path(), Platform::Web).await.unwrap();

        let gate = services.update_gate.lock().await;
        assert!(!gate.is_running());
        assert!(gate.update_info().is_none());
    }

    #[tokio::test]
    async fn shutdown_stops_pending_mobile_check() {
        let dir = tempfile::tempdir().unwrap();

        let services = AppServices::initialize(dir.path(), Platform::Android)
            .await
            .unwrap();
        assert!(services.update_gate.lock().await.is_running());

        services.shutdown().await;

        let gate = services.update_gate.lock().await;
        assert!(!gate.is_running());
        assert!(gate.update_info().is_none());
    }
}
