//! Save-time stamping for upserts and conflict resolution between local and remote copies.
//!
//! Resolution is whole-document: the winner is kept as is, no fields are merged.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HabitatError;
use crate::models::ProjectDocument;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionMode {
    /// Greater save-time timestamp wins; ties go to the local copy.
    #[default]
    LatestWins,
}

impl FromStr for ResolutionMode {
    type Err = HabitatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "latestWins" => Ok(ResolutionMode::LatestWins),
            other => Err(HabitatError::UnknownResolutionMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Local,
    Remote,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Local => f.write_str("local"),
            Side::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub winner: Side,
    pub document: ProjectDocument,
}

pub fn resolve(local: ProjectDocument, remote: ProjectDocument, mode: ResolutionMode) -> Resolution {
    match mode {
        ResolutionMode::LatestWins => {
            // `None < Some(_)`: a copy that was never stamped loses to one that was.
            if remote.timestamp > local.timestamp {
                Resolution {
                    winner: Side::Remote,
                    document: remote,
                }
            } else {
                Resolution {
                    winner: Side::Local,
                    document: local,
                }
            }
        }
    }
}

/// The merge function a save hands to `LocalStore::upsert`.
///
/// `saved_at` is the moment the user saved, captured by the caller before any I/O, so a
/// write that completes late still records when the work was produced.
pub fn stamp_save(
    payload: Value,
    saved_at: DateTime<Utc>,
) -> impl FnOnce(ProjectDocument) -> ProjectDocument + Send + 'static {
    move |mut existing| {
        existing.data = payload;
        existing.timestamp = Some(saved_at);
        existing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn copy(marker: &str, timestamp: Option<DateTime<Utc>>) -> ProjectDocument {
        ProjectDocument {
            id: "doc1".into(),
            rev: None,
            locale: "proj-A".into(),
            owner: None,
            timestamp,
            data: json!({ "from": marker }),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn strictly_newer_remote_wins() {
        let resolution = resolve(
            copy("local", Some(at(0))),
            copy("remote", Some(at(1))),
            ResolutionMode::LatestWins,
        );
        assert_eq!(resolution.winner, Side::Remote);
        assert_eq!(resolution.document.data, json!({ "from": "remote" }));
    }

    #[test]
    fn newer_local_wins() {
        let resolution = resolve(
            copy("local", Some(at(5))),
            copy("remote", Some(at(1))),
            ResolutionMode::LatestWins,
        );
        assert_eq!(resolution.winner, Side::Local);
    }

    #[test]
    fn equal_timestamps_favor_local() {
        let resolution = resolve(
            copy("local", Some(at(3))),
            copy("remote", Some(at(3))),
            ResolutionMode::LatestWins,
        );
        assert_eq!(resolution.winner, Side::Local);
        assert_eq!(resolution.document.data, json!({ "from": "local" }));
    }

    #[test]
    fn unstamped_copies_lose_and_two_unstamped_copies_favor_local() {
        let stamped_remote = resolve(
            copy("local", None),
            copy("remote", Some(at(0))),
            ResolutionMode::LatestWins,
        );
        assert_eq!(stamped_remote.winner, Side::Remote);

        let neither = resolve(copy("local", None), copy("remote", None), ResolutionMode::LatestWins);
        assert_eq!(neither.winner, Side::Local);
    }

    #[test]
    fn stamp_save_uses_the_supplied_clock_value() {
        let saved_at = at(-60);
        let merged = stamp_save(json!({ "x": 2 }), saved_at)(copy("old", Some(at(-120))));
        assert_eq!(merged.timestamp, Some(saved_at));
        assert_eq!(merged.data, json!({ "x": 2 }));
    }

    #[test]
    fn resolution_modes_parse_by_name() {
        assert_eq!(
            "latestWins".parse::<ResolutionMode>().unwrap(),
            ResolutionMode::LatestWins
        );
        assert!(matches!(
            "fieldMerge".parse::<ResolutionMode>(),
            Err(HabitatError::UnknownResolutionMode(name)) if name == "fieldMerge"
        ));
    }
}
