//! Shapes reported by the document transport.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Revision;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocaleInfo {
    pub db_name: String,
    pub doc_count: u64,
    /// Count of successful writes since the database was created.
    pub update_seq: u64,
    pub path: PathBuf,
}

/// Returned by every successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteReceipt {
    pub id: String,
    pub rev: Revision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationReport {
    pub source: String,
    pub target: String,
    pub docs_read: u64,
    pub docs_written: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
