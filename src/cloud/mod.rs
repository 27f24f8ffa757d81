//! Named commands to the cloud's single command endpoint.

pub mod command;
#[cfg(feature = "desktop")]
pub mod commands;
pub mod response;
pub mod validation;

use std::sync::Arc;

use reqwest::header::ACCEPT;
use serde_json::Value;
use url::Url;

use crate::error::{HabitatError, Result};
use crate::models::Envelope;
use crate::session::SessionManager;
use crate::settings::CloudSettings;

pub use command::CloudCommand;
pub use response::ResponseBody;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const REQUEST_PATH: &str = "habitat-request";

/// Whether a command may open the login surface when the proxy wants a login.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoginPolicy {
    /// A user action: log in if needed.
    #[default]
    Interactive,
    /// Background work: fail with `LoginRequired` instead.
    Never,
}

pub struct CloudDispatcher {
    sessions: Arc<SessionManager>,
    endpoint: Url,
    probe: Url,
}

impl CloudDispatcher {
    pub fn new(sessions: Arc<SessionManager>, base: &Url, probe: Url) -> Result<Self> {
        Ok(Self {
            sessions,
            endpoint: endpoint_of(base)?,
            probe,
        })
    }

    pub fn from_settings(sessions: Arc<SessionManager>, cloud: &CloudSettings) -> Result<Self> {
        let base = cloud.base_url()?;
        let probe = cloud.probe_address()?;
        Self::new(sessions, &base, probe)
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub async fn dispatch(&self, command: CloudCommand) -> Result<Envelope> {
        self.dispatch_with(command, LoginPolicy::Interactive).await
    }

    /// Validates, checks the session under `login`, posts once. Never retries.
    pub async fn dispatch_with(
        &self,
        command: CloudCommand,
        login: LoginPolicy,
    ) -> Result<Envelope> {
        validation::validate(&command)?;

        if command.requires_session() {
            match login {
                LoginPolicy::Interactive => self.sessions.assure_session(&self.probe).await?,
                LoginPolicy::Never => self.sessions.check_session(&self.probe).await?,
            };
        }

        let name = command.name();
        let body = command.to_body()?;
        log_info!("Dispatching {name} to {}", self.endpoint);

        let reply = self
            .sessions
            .client()
            .post(self.endpoint.clone())
            .header(ACCEPT, "application/json, text/plain")
            .json(&body)
            .send()
            .await?;

        match response::read_envelope(name, reply).await {
            Ok(envelope) => Ok(envelope),
            Err(err) => {
                log_warn!("Cloud command {name} failed: {err}");
                Err(err)
            }
        }
    }

    pub async fn dispatch_named(&self, name: &str, args: Value) -> Result<Envelope> {
        let command = CloudCommand::from_named(name, args)?;
        self.dispatch(command).await
    }
}

fn endpoint_of(base: &Url) -> Result<Url> {
    let mut root = base.clone();
    root.set_query(None);
    root.set_fragment(None);
    if !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }
    root.join(REQUEST_PATH)
        .map_err(|err| HabitatError::InvalidAddress {
            address: base.to_string(),
            reason: err.to_string(),
        })
}
