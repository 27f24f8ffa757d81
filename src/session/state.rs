use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

/// Whether the process currently holds a proxy session. The credential itself lives in the
/// session's cookie jar and is never exposed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SessionState {
    Unauthenticated,
    Authenticated { remote: Url, since: DateTime<Utc> },
}

impl SessionState {
    pub fn authenticated(remote: &Url) -> Self {
        SessionState::Authenticated {
            remote: remote.clone(),
            since: Utc::now(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }
}
