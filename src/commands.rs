use tauri::{AppHandle, Emitter, State};
use tauri_plugin_opener::OpenerExt;

use crate::{
    auth::SessionSnapshot,
    settings::UpdateSettings,
    update::VersionDescriptor,
    AppState,
};

pub const SESSION_CHANGED_EVENT: &str = "session-changed";
pub const UPDATE_AVAILABLE_EVENT: &str = "update-available";

fn emit_session(app_handle: &AppHandle, snapshot: &SessionSnapshot) -> Result<(), String> {
    app_handle
        .emit(SESSION_CHANGED_EVENT, snapshot)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_update_info(
    state: State<'_, AppState>,
) -> Result<Option<VersionDescriptor>, String> {
    Ok(state.services.update_gate.lock().await.update_info())
}

#[tauri::command]
pub async fn open_update_download(
    state: State<'_, AppState>,
    app_handle: AppHandle,
) -> Result<(), String> {
    let info = state.services.update_gate.lock().await.update_info();
    let url = info
        .and_then(|descriptor| descriptor.download_url)
        .ok_or_else(|| "no update download is available".to_string())?;

    app_handle
        .opener()
        .open_url(url, None::<&str>)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_session_state(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    Ok(state.services.sessions.snapshot())
}

#[tauri::command]
pub async fn login_user(
    state: State<'_, AppState>,
    app_handle: AppHandle,
    username: String,
    password: String,
) -> Result<bool, String> {
    let sessions = &state.services.sessions;
    let success = sessions.login(&username, &password).await;
    if success {
        emit_session(&app_handle, &sessions.snapshot())?;
    }
    Ok(success)
}

#[tauri::command]
pub async fn logout_user(state: State<'_, AppState>, app_handle: AppHandle) -> Result<(), String> {
    let sessions = &state.services.sessions;
    sessions.logout().await;
    emit_session(&app_handle, &sessions.snapshot())
}

#[tauri::command]
pub fn get_update_settings(state: State<'_, AppState>) -> Result<UpdateSettings, String> {
    Ok(state.services.settings.update())
}

#[tauri::command]
pub fn set_update_settings(
    state: State<'_, AppState>,
    settings: UpdateSettings,
) -> Result<(), String> {
    state
        .services
        .settings
        .set_update(settings)
        .map_err(|e| e.to_string())
}
