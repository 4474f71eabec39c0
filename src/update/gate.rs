use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::platform::Platform;

use super::{VersionDescriptor, VersionSource, CURRENT_VERSION_CODE};

#[derive(Debug, Clone)]
pub struct UpdateCheckOptions {
    pub platform: Platform,
    pub target_platforms: Vec<Platform>,
    pub current_version_code: u64,
    pub grace_period: Duration,
}

impl UpdateCheckOptions {
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            platform,
            target_platforms: vec![Platform::Android, Platform::Ios],
            current_version_code: CURRENT_VERSION_CODE,
            grace_period: Duration::from_secs(3),
        }
    }

    pub fn is_targeted(&self) -> bool {
        self.platform.is_native() && self.target_platforms.contains(&self.platform)
    }
}

/// Returns the descriptor only when it is strictly newer than `current`.
pub fn newer_release(descriptor: VersionDescriptor, current: u64) -> Option<VersionDescriptor> {
    descriptor.is_newer_than(current).then_some(descriptor)
}

/// One-shot background version check for the current launch.
///
/// The result is published through a watch channel so the UI can either poll
/// [`UpdateGate::update_info`] or await changes. Tearing the gate down (or
/// dropping it) before the check finishes means nothing is ever published.
pub struct UpdateGate {
    update_info: watch::Receiver<Option<VersionDescriptor>>,
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl UpdateGate {
    pub fn spawn(source: Arc<dyn VersionSource>, options: UpdateCheckOptions) -> Self {
        let (info_tx, info_rx) = watch::channel(None);
        let cancel_token = CancellationToken::new();

        let handle = if options.is_targeted() {
            let token = cancel_token.clone();
            Some(tokio::spawn(async move {
                if let Some(descriptor) = run_update_check(source, &options, &token).await {
                    if token.is_cancelled() {
                        debug!("Discarding update result that resolved after teardown");
                        return;
                    }
                    info!(
                        "Update available: {} (code {}, running {})",
                        descriptor.latest_version_label,
                        descriptor.version_code,
                        options.current_version_code
                    );
                    let _ = info_tx.send(Some(descriptor));
                }
            }))
        } else {
            debug!("Skipping update check on {}", options.platform);
            None
        };

        Self {
            update_info: info_rx,
            cancel_token,
            handle,
        }
    }

    pub fn update_info(&self) -> Option<VersionDescriptor> {
        self.update_info.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<VersionDescriptor>> {
        self.update_info.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub async fn teardown(&mut self) {
        self.cancel_token.cancel();

        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!("Update check task failed to join: {err}");
            }
        }
    }
}

impl Drop for UpdateGate {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn run_update_check(
    source: Arc<dyn VersionSource>,
    options: &UpdateCheckOptions,
    cancel_token: &CancellationToken,
) -> Option<VersionDescriptor> {
    tokio::select! {
        _ = tokio::time::sleep(options.grace_period) => {}
        _ = cancel_token.cancelled() => {
            debug!("Update check cancelled during grace period");
            return None;
        }
    }

    let fetched = tokio::select! {
        result = source.fetch_descriptor() => result,
        _ = cancel_token.cancelled() => {
            debug!("Update check cancelled while fetching");
            return None;
        }
    };

    match fetched {
        Ok(descriptor) => {
            let newer = newer_release(descriptor, options.current_version_code);
            if newer.is_none() {
                debug!("Running build {} is current", options.current_version_code);
            }
            newer
        }
        Err(err) => {
            warn!("Update check failed: {err}");
            None
        }
    }
}
