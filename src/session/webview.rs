//! The login surface as a Tauri webview window.

use async_trait::async_trait;
use tauri::{
    webview::PageLoadEvent, AppHandle, Manager, WebviewUrl, WebviewWindow, WebviewWindowBuilder,
    WindowEvent,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use url::Url;

use super::login::{LoginSurface, LoginWindow, SurfaceEvent};
use crate::error::{HabitatError, Result};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

const LOGIN_WINDOW_LABEL: &str = "habitat-login";

pub struct TauriLoginSurface {
    app: AppHandle,
}

impl TauriLoginSurface {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

#[async_trait]
impl LoginSurface for TauriLoginSurface {
    async fn open(&self, address: &Url) -> Result<Box<dyn LoginWindow>> {
        // A window left over from an earlier attempt would block the label.
        if let Some(stale) = self.app.get_webview_window(LOGIN_WINDOW_LABEL) {
            if let Err(err) = stale.destroy() {
                log_warn!("Failed to destroy stale login window: {err}");
            }
        }

        let (tx, events) = mpsc::unbounded_channel();
        let page_tx = tx.clone();

        let window = WebviewWindowBuilder::new(
            &self.app,
            LOGIN_WINDOW_LABEL,
            WebviewUrl::External(address.clone()),
        )
        .title("Sign in to Habitat")
        .inner_size(520.0, 720.0)
        .on_page_load(move |_window, payload| {
            if matches!(payload.event(), PageLoadEvent::Finished) {
                let _ = page_tx.send(SurfaceEvent::Navigated(payload.url().clone()));
            }
        })
        .build()
        .map_err(|err| HabitatError::UnexpectedSessionError {
            remote: address.to_string(),
            reason: format!("failed to open login window: {err}"),
        })?;

        window.on_window_event(move |event| {
            if matches!(event, WindowEvent::Destroyed) {
                let _ = tx.send(SurfaceEvent::Closed);
            }
        });

        Ok(Box::new(TauriLoginWindow { window, events }))
    }
}

struct TauriLoginWindow {
    window: WebviewWindow,
    events: UnboundedReceiver<SurfaceEvent>,
}

#[async_trait]
impl LoginWindow for TauriLoginWindow {
    async fn next_event(&mut self) -> Option<SurfaceEvent> {
        self.events.recv().await
    }

    async fn credentials(&mut self, root: &Url) -> Result<Vec<String>> {
        let cookies = self
            .window
            .cookies_for_url(root.clone())
            .map_err(|err| HabitatError::UnexpectedSessionError {
                remote: root.to_string(),
                reason: format!("failed to read login cookies: {err}"),
            })?;

        Ok(cookies
            .iter()
            .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
            .collect())
    }

    async fn close(&mut self) {
        if let Err(err) = self.window.destroy() {
            log_warn!("Failed to close login window: {err}");
        }
    }
}
