use serde_json::Value;
use tauri::State;

use crate::{models::Envelope, AppState};

/// Runs one named cloud command, e.g. `listProjects` with `{ "locale": "proj-A" }`.
#[tauri::command]
pub async fn cloud_request(
    state: State<'_, AppState>,
    command: String,
    args: Option<Value>,
) -> Result<Envelope, String> {
    state
        .cloud
        .dispatch_named(&command, args.unwrap_or(Value::Null))
        .await
        .map_err(|e| e.to_string())
}
