use chrono::{DateTime, Utc};
use serde_json::Value;
use tauri::State;

use crate::{
    db::{LocaleInfo, ReplicationReport, WriteReceipt},
    models::{Envelope, ProjectDocument, Revision},
    AppState,
};

#[tauri::command]
pub async fn locale_status(state: State<'_, AppState>, locale: String) -> Result<LocaleInfo, String> {
    let store = &state.store;
    let handle = store.open(&locale).await.map_err(|e| e.to_string())?;
    store.status(&handle).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn load_local_project(
    state: State<'_, AppState>,
    locale: String,
    id: String,
) -> Result<Envelope<Value>, String> {
    let store = &state.store;
    let handle = store.open(&locale).await.map_err(|e| e.to_string())?;
    store
        .load_project(&handle, &id)
        .await
        .map_err(|e| e.to_string())
}

/// `saved_at` is the moment the user hit save; the UI supplies it so queued saves keep it.
#[tauri::command]
pub async fn save_local_project(
    state: State<'_, AppState>,
    locale: String,
    id: String,
    payload: Value,
    saved_at: Option<DateTime<Utc>>,
) -> Result<Envelope<WriteReceipt>, String> {
    let saved_at = saved_at.unwrap_or_else(Utc::now);
    let store = &state.store;
    let handle = store.open(&locale).await.map_err(|e| e.to_string())?;
    store
        .save_project(&handle, &id, payload, saved_at)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn list_local_projects(
    state: State<'_, AppState>,
    locale: String,
) -> Result<Vec<ProjectDocument>, String> {
    let store = &state.store;
    let handle = store.open(&locale).await.map_err(|e| e.to_string())?;
    store.list(&handle).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn remove_local_project(
    state: State<'_, AppState>,
    locale: String,
    id: String,
    rev: String,
) -> Result<Envelope<()>, String> {
    let store = &state.store;
    let handle = store.open(&locale).await.map_err(|e| e.to_string())?;
    store
        .remove(&handle, &id, &Revision::from(rev))
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn replicate_locale(
    state: State<'_, AppState>,
    from: String,
    to: String,
) -> Result<Envelope<ReplicationReport>, String> {
    state
        .store
        .replicate(&from, &to)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn destroy_locale(state: State<'_, AppState>, locale: String) -> Result<Envelope<()>, String> {
    state
        .store
        .destroy(&locale)
        .await
        .map_err(|e| e.to_string())
}
