//! Error taxonomy shared by the store, session and cloud layers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HabitatError {
    /// Read miss. Callers that upsert treat this as the create path.
    #[error("document {id} not found in locale {locale}")]
    NotFound { locale: String, id: String },

    /// The stored revision moved since it was read; re-read and reapply.
    #[error("stale write to {id}: wrote against revision {expected}, store holds {actual}")]
    StaleWrite {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("incomplete project: missing {}", .missing.join(", "))]
    IncompleteProject { missing: Vec<&'static str> },

    #[error("unexpected session error for {remote}: {reason}")]
    UnexpectedSessionError { remote: String, reason: String },

    #[error("not logged in: {0}")]
    LoginAbandoned(String),

    /// The proxy wants a login, but the caller may not open the login surface.
    #[error("session with {remote} needs a login: {reason}")]
    LoginRequired { remote: String, reason: String },

    #[error("login to {0} timed out")]
    LoginTimedOut(String),

    #[error("cloud command {command} failed: {msg}")]
    RemoteOperationFailed { command: String, msg: String },

    #[error("unknown cloud command '{0}'")]
    UnknownCommand(String),

    #[error("invalid arguments for {command}: {reason}")]
    InvalidArguments { command: String, reason: String },

    #[error("unknown resolution mode '{0}'")]
    UnknownResolutionMode(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("cloud transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(anyhow::Error),
}

impl HabitatError {
    /// Only stale writes are worth retrying, after a fresh read.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HabitatError::StaleWrite { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, HabitatError::NotFound { .. })
    }
}

// Worker tasks report through anyhow; typed errors raised inside them come back out here.
impl From<anyhow::Error> for HabitatError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<HabitatError>() {
            Ok(typed) => typed,
            Err(other) => HabitatError::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, HabitatError>;
