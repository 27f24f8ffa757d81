use reqwest::{header::CONTENT_TYPE, Response, StatusCode};
use serde_json::{json, Value};

use crate::error::{HabitatError, Result};
use crate::models::Envelope;

/// A command response, tagged by its declared content type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Text(String),
    Json(Value),
}

impl ResponseBody {
    pub fn decode(content_type: Option<&str>, body: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(body);
        if content_type.is_some_and(|value| value.contains("text/plain")) {
            return Ok(ResponseBody::Text(text.into_owned()));
        }

        serde_json::from_slice(body).map(ResponseBody::Json).map_err(|err| {
            HabitatError::MalformedResponse(format!(
                "expected JSON ({err}), got: {}",
                snippet(&text)
            ))
        })
    }

    /// Text becomes a successful envelope whose message is the text; JSON must already be
    /// an envelope.
    pub fn into_envelope(self) -> Result<Envelope> {
        match self {
            ResponseBody::Text(text) => Ok(Envelope::success(text, json!({ "no": "data" }))),
            ResponseBody::Json(value) => {
                let envelope: Envelope = serde_json::from_value(value).map_err(|err| {
                    HabitatError::MalformedResponse(format!("not a command envelope: {err}"))
                })?;
                Ok(envelope.normalized())
            }
        }
    }
}

/// Reads a response into a normalized envelope, raising `ok: false` and HTTP failures as
/// `RemoteOperationFailed`.
pub async fn read_envelope(command: &str, response: Response) -> Result<Envelope> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = response.bytes().await?;

    envelope_from_parts(command, status, content_type.as_deref(), &body)
}

pub fn envelope_from_parts(
    command: &str,
    status: StatusCode,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<Envelope> {
    let decoded = ResponseBody::decode(content_type, body).and_then(ResponseBody::into_envelope);

    if !status.is_success() {
        let msg = match decoded {
            Ok(envelope) if !envelope.ok => envelope.msg,
            _ => format!("HTTP {status}: {}", snippet(&String::from_utf8_lossy(body))),
        };
        return Err(HabitatError::RemoteOperationFailed {
            command: command.to_string(),
            msg,
        });
    }

    decoded?.into_result(command)
}

fn snippet(text: &str) -> String {
    const LIMIT: usize = 200;
    let trimmed = text.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
