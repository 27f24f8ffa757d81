use tauri::State;
use url::Url;

use super::SessionState;
use crate::{models::Envelope, AppState};

#[tauri::command]
pub async fn get_session_state(state: State<'_, AppState>) -> Result<SessionState, String> {
    Ok(state.sessions.state())
}

/// Probes `remote`, or the configured cloud probe address, logging in if the proxy asks.
#[tauri::command]
pub async fn assure_session(
    state: State<'_, AppState>,
    remote: Option<String>,
) -> Result<Envelope<()>, String> {
    let remote = match remote {
        Some(raw) => Url::parse(&raw).map_err(|e| format!("invalid remote address {raw}: {e}"))?,
        None => state
            .settings
            .cloud()
            .probe_address()
            .map_err(|e| e.to_string())?,
    };

    state
        .sessions
        .assure_session(&remote)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn logout(state: State<'_, AppState>) -> Result<Envelope<()>, String> {
    state.sessions.logout().await.map_err(|e| e.to_string())
}
