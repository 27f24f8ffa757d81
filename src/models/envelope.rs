//! The `{ ok, msg, data }` shape every cloud command and every local write resolves to.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HabitatError, Result};

const FALLBACK_FAILURE_MSG: &str = "operation failed without a message";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    pub ok: bool,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn success(msg: impl Into<String>, data: T) -> Self {
        Self {
            ok: true,
            msg: msg.into(),
            data: Some(data),
        }
    }

    /// A failed envelope never carries data and never carries an empty message.
    pub fn failure(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        Self {
            ok: false,
            msg: if msg.trim().is_empty() {
                FALLBACK_FAILURE_MSG.to_string()
            } else {
                msg
            },
            data: None,
        }
    }

    /// Raises `ok: false` as `RemoteOperationFailed` so callers handle every command alike.
    pub fn into_result(self, command: &str) -> Result<Self> {
        if self.ok {
            Ok(self)
        } else {
            Err(HabitatError::RemoteOperationFailed {
                command: command.to_string(),
                msg: self.msg,
            })
        }
    }
}

impl Envelope<Value> {
    /// Restores the invariant that a failure carries a message and no data.
    pub fn normalized(self) -> Self {
        if self.ok {
            self
        } else {
            Envelope::failure(self.msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_always_has_a_message() {
        let envelope: Envelope = Envelope::failure("  ");
        assert!(!envelope.ok);
        assert_eq!(envelope.msg, FALLBACK_FAILURE_MSG);
        assert!(envelope.data.is_none());
    }

    #[test]
    fn normalized_drops_data_from_failures() {
        let raw: Envelope = serde_json::from_value(json!({
            "ok": false,
            "data": { "leaked": true }
        }))
        .unwrap();

        let envelope = raw.normalized();
        assert_eq!(envelope.msg, FALLBACK_FAILURE_MSG);
        assert!(envelope.data.is_none());
    }

    #[test]
    fn into_result_raises_remote_failures() {
        let envelope: Envelope = Envelope::failure("no such locale");
        let err = envelope.into_result("deleteLocale").unwrap_err();
        match err {
            HabitatError::RemoteOperationFailed { command, msg } => {
                assert_eq!(command, "deleteLocale");
                assert_eq!(msg, "no such locale");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
