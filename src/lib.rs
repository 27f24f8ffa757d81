pub mod cloud;
pub mod db;
pub mod error;
pub mod merge;
pub mod models;
pub mod session;
pub mod settings;
pub mod store;
pub mod sync;
mod utils;

pub use error::{HabitatError, Result};

#[cfg(feature = "desktop")]
mod desktop {
    use std::sync::Arc;

    use tauri::Manager;

    use crate::{
        cloud::{commands::cloud_request, CloudDispatcher},
        session::{
            commands::{assure_session, get_session_state, logout},
            webview::TauriLoginSurface,
            SessionConfig, SessionManager,
        },
        settings::SettingsStore,
        store::{
            commands::{
                destroy_locale, list_local_projects, load_local_project, locale_status,
                remove_local_project, replicate_locale, save_local_project,
            },
            LocalStore,
        },
        sync::{
            commands::{get_sync_settings, start_sync, stop_sync, sync_locale_now, sync_project},
            SyncController, Synchronizer,
        },
    };

    pub(crate) struct AppState {
        pub(crate) store: Arc<LocalStore>,
        pub(crate) sessions: Arc<SessionManager>,
        pub(crate) cloud: Arc<CloudDispatcher>,
        pub(crate) synchronizer: Arc<Synchronizer>,
        pub(crate) sync: tokio::sync::Mutex<SyncController>,
        pub(crate) settings: SettingsStore,
    }

    #[cfg_attr(mobile, tauri::mobile_entry_point)]
    pub fn run() {
        // Info by default; RUST_LOG overrides.
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

        log::info!("Habitat starting up...");

        tauri::Builder::default()
            .setup(|app| {
                let result = (|| -> anyhow::Result<()> {
                    let app_data_dir = app
                        .path()
                        .app_data_dir()
                        .map_err(|err| anyhow::anyhow!(err))?;
                    std::fs::create_dir_all(&app_data_dir)?;

                    let settings = SettingsStore::new(app_data_dir.join("settings.json"))?;
                    let snapshot = settings.snapshot();

                    let store = Arc::new(LocalStore::new(app_data_dir.join("locales")));
                    let surface = Arc::new(TauriLoginSurface::new(app.handle().clone()));
                    let sessions = Arc::new(SessionManager::new(
                        SessionConfig::from_settings(&snapshot.cloud, &snapshot.login),
                        surface,
                    )?);
                    let cloud = Arc::new(CloudDispatcher::from_settings(
                        Arc::clone(&sessions),
                        &snapshot.cloud,
                    )?);
                    let synchronizer =
                        Arc::new(Synchronizer::new(Arc::clone(&store), Arc::clone(&cloud)));

                    let mut sync = SyncController::new();
                    if snapshot.sync.enabled && !snapshot.sync.locales.is_empty() {
                        // The loop is spawned onto the app's runtime.
                        tauri::async_runtime::block_on(async {
                            sync.start(
                                Arc::clone(&synchronizer),
                                snapshot.sync.locales.clone(),
                                snapshot.sync.interval(),
                            )
                        })?;
                    }

                    app.manage(AppState {
                        store,
                        sessions,
                        cloud,
                        synchronizer,
                        sync: tokio::sync::Mutex::new(sync),
                        settings,
                    });

                    Ok(())
                })();

                result.map_err(|err| err.into())
            })
            .invoke_handler(tauri::generate_handler![
                locale_status,
                load_local_project,
                save_local_project,
                list_local_projects,
                remove_local_project,
                replicate_locale,
                destroy_locale,
                get_session_state,
                assure_session,
                logout,
                cloud_request,
                sync_project,
                sync_locale_now,
                start_sync,
                stop_sync,
                get_sync_settings,
            ])
            .run(tauri::generate_context!())
            .expect("error while running tauri application");
    }
}

#[cfg(feature = "desktop")]
pub(crate) use desktop::AppState;
#[cfg(feature = "desktop")]
pub use desktop::run;
