pub mod app;
pub mod auth;
#[cfg(feature = "shell")]
mod commands;
pub mod db;
pub mod error;
pub mod platform;
pub mod settings;
pub mod storage;
pub mod update;

pub use app::AppServices;
pub use error::AppError;
pub use platform::Platform;

/// Installs the `env_logger` backend. `RUST_LOG` refines the default `info` level.
pub fn init_logging() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}

#[cfg(feature = "shell")]
pub(crate) struct AppState {
    pub(crate) services: AppServices,
}

#[cfg(feature = "shell")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use commands::{
        get_session_state, get_update_info, get_update_settings, login_user, logout_user,
        open_update_download, set_update_settings, UPDATE_AVAILABLE_EVENT,
    };
    use tauri::{Emitter, Manager};

    init_logging();

    log::info!("Project map starting up...");

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let result = (|| -> anyhow::Result<()> {
                let app_data_dir = app
                    .path()
                    .app_data_dir()
                    .map_err(|err| anyhow::anyhow!(err))?;

                let services = tauri::async_runtime::block_on(AppServices::initialize(
                    &app_data_dir,
                    Platform::current(),
                ))?;

                let mut update_rx = tauri::async_runtime::block_on(async {
                    services.update_gate.lock().await.subscribe()
                });
                let handle = app.handle().clone();
                tauri::async_runtime::spawn(async move {
                    while update_rx.changed().await.is_ok() {
                        let info = update_rx.borrow_and_update().clone();
                        if let Some(descriptor) = info {
                            if let Err(err) = handle.emit(UPDATE_AVAILABLE_EVENT, &descriptor) {
                                log::error!("Failed to emit update notice: {err}");
                            }
                        }
                    }
                });

                app.manage(AppState { services });
                Ok(())
            })();

            result.map_err(|err| err.into())
        })
        .invoke_handler(tauri::generate_handler![
            get_update_info,
            open_update_download,
            get_session_state,
            login_user,
            logout_user,
            get_update_settings,
            set_update_settings,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app_handle, event| {
            if let tauri::RunEvent::Exit = event {
                if let Some(state) = app_handle.try_state::<AppState>() {
                    tauri::async_runtime::block_on(state.services.shutdown());
                }
            }
        });
}
