use std::sync::Arc;

use tauri::State;

use super::{loop_worker::sync_locale, SyncOutcome, SyncReport};
use crate::{cloud::LoginPolicy, settings::SyncSettings, AppState};

#[tauri::command]
pub async fn sync_project(
    state: State<'_, AppState>,
    locale: String,
    project: String,
) -> Result<SyncOutcome, String> {
    let handle = state
        .synchronizer
        .store()
        .open(&locale)
        .await
        .map_err(|e| e.to_string())?;
    state
        .synchronizer
        .reconcile(&handle, &project, LoginPolicy::Interactive)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn sync_locale_now(state: State<'_, AppState>, locale: String) -> Result<SyncReport, String> {
    sync_locale(&state.synchronizer, &locale, LoginPolicy::Interactive)
        .await
        .map_err(|e| e.to_string())
}

/// Starts the background loop and remembers the choice for the next launch.
#[tauri::command]
pub async fn start_sync(
    state: State<'_, AppState>,
    locales: Vec<String>,
    interval_secs: Option<u64>,
) -> Result<(), String> {
    let mut settings = state.settings.sync();
    settings.enabled = true;
    settings.locales = locales;
    if let Some(secs) = interval_secs {
        settings.interval_secs = secs;
    }

    let mut controller = state.sync.lock().await;
    controller
        .start(
            Arc::clone(&state.synchronizer),
            settings.locales.clone(),
            settings.interval(),
        )
        .map_err(|e| e.to_string())?;

    state.settings.update_sync(settings).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn stop_sync(state: State<'_, AppState>) -> Result<(), String> {
    state
        .sync
        .lock()
        .await
        .stop()
        .await
        .map_err(|e| e.to_string())?;

    let settings = SyncSettings {
        enabled: false,
        ..state.settings.sync()
    };
    state.settings.update_sync(settings).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_sync_settings(state: State<'_, AppState>) -> Result<SyncSettings, String> {
    Ok(state.settings.sync())
}
