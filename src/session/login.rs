//! The interactive half of a session: a surface the user signs in on, and the driver that
//! watches it until the proxy lands the user on its post-login page.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::{address::LoginAddresses, jar::SessionJar};
use crate::error::{HabitatError, Result};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// A page finished loading at this address.
    Navigated(Url),
    /// The user closed the surface.
    Closed,
}

/// Something that can show the proxy's sign-in page to the user.
#[async_trait]
pub trait LoginSurface: Send + Sync {
    async fn open(&self, address: &Url) -> Result<Box<dyn LoginWindow>>;
}

#[async_trait]
pub trait LoginWindow: Send {
    /// `None` once the surface is gone and no more events will arrive.
    async fn next_event(&mut self) -> Option<SurfaceEvent>;

    /// The surface's cookies for `root`, as `name=value` strings.
    async fn credentials(&mut self, root: &Url) -> Result<Vec<String>>;

    async fn close(&mut self);
}

enum Landing {
    Reached,
    Abandoned,
}

/// Opens the sign-in page and waits for the landing address. On success the credential is
/// in `jar` and the surface is closed.
pub(crate) async fn run_login(
    surface: &dyn LoginSurface,
    addresses: &LoginAddresses,
    jar: &SessionJar,
    timeout: Option<Duration>,
) -> Result<()> {
    log_info!("Opening login surface at {}", addresses.sign_in);
    let mut window = surface.open(&addresses.sign_in).await?;

    let landing = match timeout {
        Some(limit) => {
            match tokio::time::timeout(limit, wait_for_landing(window.as_mut(), addresses)).await {
                Ok(landing) => landing,
                Err(_) => {
                    log_warn!("Login at {} timed out after {limit:?}", addresses.root);
                    window.close().await;
                    return Err(HabitatError::LoginTimedOut(addresses.root.to_string()));
                }
            }
        }
        None => wait_for_landing(window.as_mut(), addresses).await,
    };

    match landing {
        Landing::Reached => {
            let copied = copy_credentials(window.as_mut(), addresses, jar).await;
            window.close().await;
            copied?;
            log_info!("Logged in to {}", addresses.root);
            Ok(())
        }
        Landing::Abandoned => Err(HabitatError::LoginAbandoned(format!(
            "the login window for {} was closed before sign-in completed",
            addresses.root
        ))),
    }
}

async fn wait_for_landing(window: &mut dyn LoginWindow, addresses: &LoginAddresses) -> Landing {
    while let Some(event) = window.next_event().await {
        match event {
            SurfaceEvent::Navigated(url) if addresses.is_landing(&url) => return Landing::Reached,
            SurfaceEvent::Navigated(_) => {}
            SurfaceEvent::Closed => return Landing::Abandoned,
        }
    }
    Landing::Abandoned
}

async fn copy_credentials(
    window: &mut dyn LoginWindow,
    addresses: &LoginAddresses,
    jar: &SessionJar,
) -> Result<()> {
    let cookies = window.credentials(&addresses.root).await?;
    if cookies.is_empty() {
        log_warn!("Login surface reported no cookies for {}", addresses.root);
    }
    jar.store(&addresses.root, &cookies);
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::scripted::ScriptedSurface;
    use super::*;
    use std::sync::atomic::Ordering;

    fn addresses() -> LoginAddresses {
        LoginAddresses::derive(
            &Url::parse("https://hd.example.com/habitat-projects").unwrap(),
            "sign_in",
            None,
        )
        .unwrap()
    }

    fn jar() -> SessionJar {
        SessionJar::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap()
    }

    fn nav(raw: &str) -> SurfaceEvent {
        SurfaceEvent::Navigated(Url::parse(raw).unwrap())
    }

    #[tokio::test]
    async fn landing_copies_cookies_and_closes_the_window() {
        let surface = ScriptedSurface::new(
            vec![
                nav("https://accounts.example.org/o/oauth2/auth"),
                nav("https://hd.example.com/#"),
            ],
            &["_oauth2_proxy=abc"],
        );
        let jar = jar();
        let addresses = addresses();

        run_login(&surface, &addresses, &jar, None).await.unwrap();

        assert_eq!(
            surface.opened_at.lock().unwrap().as_slice(),
            [addresses.sign_in.clone()]
        );
        assert!(jar.has_cookies_for(&addresses.root));
        assert_eq!(surface.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closing_first_is_abandonment() {
        let surface = ScriptedSurface::new(
            vec![nav("https://accounts.example.org/o/oauth2/auth"), SurfaceEvent::Closed],
            &["_oauth2_proxy=abc"],
        );
        let jar = jar();

        let err = run_login(&surface, &addresses(), &jar, None).await.unwrap_err();
        assert!(matches!(err, HabitatError::LoginAbandoned(_)));
        assert!(!jar.has_cookies_for(&addresses().root));
    }

    #[tokio::test]
    async fn exhausted_surface_is_abandonment() {
        let surface = ScriptedSurface::new(vec![], &[]);
        let err = run_login(&surface, &addresses(), &jar(), None).await.unwrap_err();
        assert!(matches!(err, HabitatError::LoginAbandoned(_)));
    }

    #[tokio::test]
    async fn a_stalled_surface_times_out() {
        let mut surface = ScriptedSurface::new(vec![nav("https://hd.example.com/")], &[]);
        surface.gate = Some(Default::default());

        let err = run_login(&surface, &addresses(), &jar(), Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, HabitatError::LoginTimedOut(_)));
        assert_eq!(surface.closed.load(Ordering::SeqCst), 1);
    }
}
