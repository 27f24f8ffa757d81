//! The process's session with the cloud proxy.
//!
//! `assure_session` probes the remote; when the proxy says "not logged in" it drives the
//! login surface until the user lands on the proxy's post-login page and then keeps the
//! resulting cookie in the session jar. One login is in flight at a time.

pub mod address;
#[cfg(feature = "desktop")]
pub mod commands;
pub mod jar;
pub mod login;
pub mod probe;
pub mod state;
#[cfg(feature = "desktop")]
pub mod webview;

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, PoisonError, RwLock,
    },
    time::Duration,
};

use tokio::sync::Mutex;
use url::Url;

use crate::error::{HabitatError, Result};
use crate::models::Envelope;
use crate::settings::{CloudSettings, LoginSettings};

pub use address::LoginAddresses;
pub use jar::SessionJar;
pub use login::{LoginSurface, LoginWindow, SurfaceEvent};
pub use probe::ProbeFailure;
pub use state::SessionState;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub sign_in_path: String,
    pub landing: Option<Url>,
    pub login_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn from_settings(cloud: &CloudSettings, login: &LoginSettings) -> Self {
        Self {
            connect_timeout: cloud.connect_timeout(),
            request_timeout: cloud.request_timeout(),
            sign_in_path: login.sign_in_path.clone(),
            landing: login.landing_url.clone(),
            login_timeout: login.timeout(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_settings(&CloudSettings::default(), &LoginSettings::default())
    }
}

pub struct SessionManager {
    jar: SessionJar,
    surface: Arc<dyn LoginSurface>,
    config: SessionConfig,
    state: RwLock<SessionState>,
    /// Serializes login transitions.
    gate: Mutex<()>,
    /// Completed logins; a waiter that sees it move knows someone else already logged in.
    logins: AtomicU64,
}

impl SessionManager {
    pub fn new(config: SessionConfig, surface: Arc<dyn LoginSurface>) -> Result<Self> {
        Ok(Self {
            jar: SessionJar::new(config.connect_timeout, config.request_timeout)?,
            surface,
            config,
            state: RwLock::new(SessionState::Unauthenticated),
            gate: Mutex::new(()),
            logins: AtomicU64::new(0),
        })
    }

    /// The cookie-carrying client every cloud request goes through.
    pub fn client(&self) -> reqwest::Client {
        self.jar.client()
    }

    pub fn state(&self) -> SessionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    pub async fn assure_session(&self, remote: &Url) -> Result<Envelope<()>> {
        let seen = self.logins.load(Ordering::SeqCst);

        let failure = match probe::probe(&self.jar.client(), remote).await {
            Ok(_) => {
                self.set_state(SessionState::authenticated(remote));
                return Ok(logged_in(remote));
            }
            Err(failure) => failure,
        };

        if !failure.needs_login() {
            return Err(unexpected(remote, failure));
        }

        let _gate = self.gate.lock().await;
        if self.logins.load(Ordering::SeqCst) != seen {
            log_info!("Joined a login to {remote} that completed while waiting");
            return Ok(logged_in(remote));
        }

        log_info!("Need to log in to {remote}: {failure}");
        self.set_state(SessionState::Unauthenticated);

        let addresses = LoginAddresses::derive(
            remote,
            &self.config.sign_in_path,
            self.config.landing.as_ref(),
        )?;
        login::run_login(
            self.surface.as_ref(),
            &addresses,
            &self.jar,
            self.config.login_timeout,
        )
        .await?;

        self.logins.fetch_add(1, Ordering::SeqCst);
        self.set_state(SessionState::authenticated(remote));
        Ok(logged_in(remote))
    }

    /// Probes without ever opening the login surface. When the proxy wants a login the
    /// session drops to Unauthenticated and the caller gets `LoginRequired`.
    pub async fn check_session(&self, remote: &Url) -> Result<Envelope<()>> {
        match probe::probe(&self.jar.client(), remote).await {
            Ok(_) => {
                self.set_state(SessionState::authenticated(remote));
                Ok(logged_in(remote))
            }
            Err(failure) if failure.needs_login() => {
                log_warn!("Session with {remote} needs a login: {failure}");
                self.set_state(SessionState::Unauthenticated);
                Err(HabitatError::LoginRequired {
                    remote: remote.to_string(),
                    reason: failure.to_string(),
                })
            }
            Err(failure) => Err(unexpected(remote, failure)),
        }
    }

    /// Forgets the proxy credential. The next command will have to log in again.
    pub async fn logout(&self) -> Result<Envelope<()>> {
        let _gate = self.gate.lock().await;
        let previous = self.state();
        self.jar.reset()?;
        self.set_state(SessionState::Unauthenticated);

        let msg = match previous {
            SessionState::Authenticated { remote, .. } => format!("logged out of {remote}"),
            SessionState::Unauthenticated => "logged out".to_string(),
        };
        log_info!("{msg}");
        Ok(Envelope::success(msg, ()))
    }

    fn set_state(&self, next: SessionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

fn logged_in(remote: &Url) -> Envelope<()> {
    Envelope::success(format!("logged in to {remote}"), ())
}

fn unexpected(remote: &Url, failure: ProbeFailure) -> HabitatError {
    log_warn!("Session probe of {remote} failed: {failure}");
    HabitatError::UnexpectedSessionError {
        remote: remote.to_string(),
        reason: failure.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::login::scripted::ScriptedSurface;
    use super::*;
    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;

    /// Answers the probe with JSON only when the proxy cookie is present.
    async fn guarded(State(hits): State<Arc<AtomicUsize>>, headers: HeaderMap) -> Response {
        hits.fetch_add(1, Ordering::SeqCst);
        let authorized = headers
            .get("cookie")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("_oauth2_proxy="));
        if authorized {
            Json(json!({ "db_name": "habitat-projects" })).into_response()
        } else {
            (StatusCode::OK, "").into_response()
        }
    }

    async fn proxy(route: &str, status: Option<StatusCode>) -> (Url, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = match status {
            Some(status) => Router::new().route(route, get(move || async move { status })),
            None => Router::new().route(route, get(guarded)),
        }
        .with_state(Arc::clone(&hits));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (
            Url::parse(&format!("http://{addr}{route}")).unwrap(),
            hits,
        )
    }

    fn landing_script(remote: &Url) -> Vec<SurfaceEvent> {
        let root = address::root_of(remote);
        vec![
            SurfaceEvent::Navigated(root.join("sign_in").unwrap()),
            SurfaceEvent::Navigated(root),
        ]
    }

    fn manager(surface: Arc<ScriptedSurface>) -> SessionManager {
        let config = SessionConfig {
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            ..SessionConfig::default()
        };
        SessionManager::new(config, surface).unwrap()
    }

    #[tokio::test]
    async fn empty_probe_opens_the_sign_in_page_and_authenticates() {
        let (remote, _) = proxy("/habitat-projects", None).await;
        let surface = Arc::new(ScriptedSurface::new(
            landing_script(&remote),
            &["_oauth2_proxy=token"],
        ));
        let sessions = manager(Arc::clone(&surface));

        let envelope = sessions.assure_session(&remote).await.unwrap();
        assert!(envelope.ok);
        assert!(sessions.is_authenticated());
        assert_eq!(
            surface.opened_at.lock().unwrap()[0],
            address::root_of(&remote).join("sign_in").unwrap()
        );

        // The copied cookie now satisfies the proxy, so no second login.
        sessions.assure_session(&remote).await.unwrap();
        assert_eq!(surface.opened(), 1);
    }

    #[tokio::test]
    async fn unexpected_status_is_fatal_without_login() {
        let (remote, _) = proxy("/habitat-projects", Some(StatusCode::BAD_GATEWAY)).await;
        let surface = Arc::new(ScriptedSurface::new(landing_script(&remote), &[]));
        let sessions = manager(Arc::clone(&surface));

        let err = sessions.assure_session(&remote).await.unwrap_err();
        assert!(matches!(err, HabitatError::UnexpectedSessionError { .. }));
        assert_eq!(surface.opened(), 0);
        assert!(!sessions.is_authenticated());
    }

    #[tokio::test]
    async fn closing_the_surface_leaves_the_session_unauthenticated() {
        let (remote, _) = proxy("/habitat-projects", None).await;
        let surface = Arc::new(ScriptedSurface::new(vec![SurfaceEvent::Closed], &[]));
        let sessions = manager(Arc::clone(&surface));

        let err = sessions.assure_session(&remote).await.unwrap_err();
        assert!(matches!(err, HabitatError::LoginAbandoned(_)));
        assert_eq!(sessions.state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_login() {
        let (remote, _) = proxy("/habitat-projects", None).await;
        let release = Arc::new(tokio::sync::Notify::new());
        let mut surface = ScriptedSurface::new(landing_script(&remote), &["_oauth2_proxy=token"]);
        surface.gate = Some(Arc::clone(&release));
        let surface = Arc::new(surface);
        let sessions = Arc::new(manager(Arc::clone(&surface)));

        let first = tokio::spawn({
            let sessions = Arc::clone(&sessions);
            let remote = remote.clone();
            async move { sessions.assure_session(&remote).await }
        });
        while surface.opened() == 0 {
            tokio::task::yield_now().await;
        }

        let second = tokio::spawn({
            let sessions = Arc::clone(&sessions);
            let remote = remote.clone();
            async move { sessions.assure_session(&remote).await }
        });
        // Let the second caller probe and queue on the gate before the login completes.
        tokio::time::sleep(Duration::from_millis(200)).await;
        release.notify_one();

        assert!(first.await.unwrap().unwrap().ok);
        assert!(second.await.unwrap().unwrap().ok);
        assert_eq!(surface.opened(), 1);
    }

    #[tokio::test]
    async fn lapsed_session_check_never_opens_the_surface() {
        let (remote, _) = proxy("/habitat-projects", None).await;
        let surface = Arc::new(ScriptedSurface::new(
            landing_script(&remote),
            &["_oauth2_proxy=token"],
        ));
        let sessions = manager(Arc::clone(&surface));
        sessions.assure_session(&remote).await.unwrap();
        assert!(sessions.check_session(&remote).await.unwrap().ok);

        // The proxy cookie goes away, as when it expires.
        sessions.jar.reset().unwrap();
        let err = sessions.check_session(&remote).await.unwrap_err();

        assert!(matches!(err, HabitatError::LoginRequired { .. }));
        assert!(!sessions.is_authenticated());
        assert_eq!(surface.opened(), 1);
    }

    #[tokio::test]
    async fn logout_drops_the_credential() {
        let (remote, _) = proxy("/habitat-projects", None).await;
        let surface = Arc::new(ScriptedSurface::new(
            landing_script(&remote),
            &["_oauth2_proxy=token"],
        ));
        let sessions = manager(Arc::clone(&surface));
        sessions.assure_session(&remote).await.unwrap();

        let envelope = sessions.logout().await.unwrap();
        assert!(envelope.msg.starts_with("logged out of"));
        assert!(!sessions.is_authenticated());

        sessions.assure_session(&remote).await.unwrap();
        assert_eq!(surface.opened(), 2);
    }
}
