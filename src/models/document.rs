//! Project documents and the keys and revisions that address them.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::HabitatError;

/// Opaque version token, `"<generation>-<token>"`.
///
/// The store advances the generation on every negotiated write. Revisions that arrive
/// from the cloud are kept verbatim even when they do not follow that shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn initial() -> Self {
        Self::with_generation(1)
    }

    pub fn next(&self) -> Self {
        Self::with_generation(self.generation().saturating_add(1))
    }

    fn with_generation(generation: u64) -> Self {
        Self(format!("{generation}-{}", Uuid::new_v4().simple()))
    }

    /// Zero when the token has no numeric prefix.
    pub fn generation(&self) -> u64 {
        self.0
            .split_once('-')
            .map(|(prefix, _)| prefix)
            .unwrap_or(&self.0)
            .parse()
            .unwrap_or(0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Revision {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Revision {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// `locale:project[:identity]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    pub locale: String,
    pub project: String,
    pub identity: Option<String>,
}

impl DocumentKey {
    pub fn new(locale: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            project: project.into(),
            identity: None,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.locale, self.project)?;
        if let Some(identity) = &self.identity {
            write!(f, ":{identity}")?;
        }
        Ok(())
    }
}

impl FromStr for DocumentKey {
    type Err = HabitatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value.split(':').collect();
        let invalid = |reason: &str| HabitatError::InvalidAddress {
            address: value.to_string(),
            reason: reason.to_string(),
        };

        if parts.iter().any(|part| part.is_empty()) {
            return Err(invalid("key parts must not be empty"));
        }

        match parts.as_slice() {
            [locale, project] => Ok(Self::new(*locale, *project)),
            [locale, project, identity] => Ok(Self::new(*locale, *project).with_identity(*identity)),
            _ => Err(invalid("expected locale:project[:identity]")),
        }
    }
}

/// What a caller hands the store when saving: the payload and the moment the work was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDraft {
    pub payload: Value,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub owner: Option<String>,
}

impl ProjectDraft {
    pub fn new(payload: Value, saved_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            saved_at,
            owner: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocument {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(rename = "_rev", alias = "rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<Revision>,
    pub locale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Save time assigned by the client, not upload time.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// `frame` holds the structure, `object` the content.
    #[serde(default)]
    pub data: Value,
}

impl ProjectDocument {
    pub fn fresh(id: impl Into<String>, locale: impl Into<String>, draft: ProjectDraft) -> Self {
        Self {
            id: id.into(),
            rev: None,
            locale: locale.into(),
            owner: draft.owner,
            timestamp: Some(draft.saved_at),
            data: draft.payload,
        }
    }

    pub fn key(&self) -> DocumentKey {
        let key = DocumentKey::new(self.locale.clone(), self.id.clone());
        match &self.owner {
            Some(owner) => key.with_identity(owner.clone()),
            None => key,
        }
    }

    pub fn frame(&self) -> Option<&Value> {
        self.data.get("frame")
    }

    pub fn object(&self) -> Option<&Value> {
        self.data.get("object")
    }

    /// Equal payload and save time, revisions aside.
    pub fn same_content(&self, other: &ProjectDocument) -> bool {
        self.id == other.id && self.timestamp == other.timestamp && self.data == other.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn revision_generation_advances() {
        let first = Revision::initial();
        let second = first.next();
        assert_eq!(first.generation(), 1);
        assert_eq!(second.generation(), 2);
        assert_ne!(first, second);
    }

    #[test]
    fn foreign_revisions_are_kept_opaque() {
        let rev = Revision::from("abc");
        assert_eq!(rev.generation(), 0);
        assert_eq!(rev.next().generation(), 1);
        assert_eq!(rev.as_str(), "abc");
    }

    #[test]
    fn document_key_round_trips_with_and_without_identity() {
        let key: DocumentKey = "proj-A:doc1".parse().unwrap();
        assert_eq!(key, DocumentKey::new("proj-A", "doc1"));

        let owned: DocumentKey = "proj-A:doc1:ada@example.com".parse().unwrap();
        assert_eq!(owned.identity.as_deref(), Some("ada@example.com"));
        assert_eq!(owned.to_string(), "proj-A:doc1:ada@example.com");
    }

    #[test]
    fn document_key_rejects_malformed_input() {
        assert!("proj-A".parse::<DocumentKey>().is_err());
        assert!("proj-A::x".parse::<DocumentKey>().is_err());
        assert!("a:b:c:d".parse::<DocumentKey>().is_err());
    }

    #[test]
    fn documents_accept_couch_style_field_names() {
        let doc: ProjectDocument = serde_json::from_value(json!({
            "_id": "doc1",
            "_rev": "3-abc",
            "locale": "proj-A",
            "timestamp": "2026-01-02T03:04:05Z",
            "data": { "frame": {}, "object": { "x": 1 } }
        }))
        .unwrap();

        assert_eq!(doc.rev.as_ref().map(Revision::generation), Some(3));
        assert_eq!(doc.object(), Some(&json!({ "x": 1 })));
        assert_eq!(doc.key().to_string(), "proj-A:doc1");
    }
}
