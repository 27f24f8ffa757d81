//! Whole-database operations: open, one-shot replication, destroy.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{info, warn};

use super::{connection::Database, models::ReplicationReport};
use crate::error::HabitatError;

const DB_EXTENSION: &str = "sqlite3";

pub fn locale_db_path(data_dir: &Path, locale: &str) -> PathBuf {
    data_dir.join(format!("{locale}.{DB_EXTENSION}"))
}

pub async fn open_locale(data_dir: &Path, locale: &str) -> Result<Database> {
    let path = locale_db_path(data_dir, locale);
    let locale = locale.to_string();
    tokio::task::spawn_blocking(move || Database::new(&locale, path))
        .await
        .map_err(|err| anyhow!("database open task failed: {err}"))?
}

/// Copies every document from `from` into `to` once, keeping revisions as they are.
///
/// Documents whose revision already matches the target are skipped. Not a live feed:
/// the returned future resolves when the single pass is done.
pub async fn replicate(from: &Database, to: &Database) -> Result<ReplicationReport> {
    let started_at = Utc::now();
    let documents = from
        .list_all()
        .await
        .with_context(|| format!("failed to read replication source {}", from.locale()))?;

    let mut docs_written = 0u64;
    for doc in &documents {
        let current = match to.get_document(&doc.id).await {
            Ok(current) => current.rev,
            Err(err) if is_not_found(&err) => None,
            Err(err) => return Err(err),
        };
        if current.is_some() && current == doc.rev {
            continue;
        }

        to.put_verbatim(doc.clone())
            .await
            .with_context(|| format!("failed to replicate {} into {}", doc.id, to.locale()))?;
        docs_written += 1;
    }

    let report = ReplicationReport {
        source: from.locale().to_string(),
        target: to.locale().to_string(),
        docs_read: documents.len() as u64,
        docs_written,
        started_at,
        finished_at: Utc::now(),
    };
    info!(
        "Replicated {} -> {}: {} read, {} written",
        report.source, report.target, report.docs_read, report.docs_written
    );
    Ok(report)
}

/// Empties the database and deletes its files once no other handle keeps it open.
///
/// Returns whether the files were removed. While other handles live the contents are
/// already gone and only the file removal is skipped.
pub async fn destroy(db: Database) -> Result<bool> {
    db.clear().await?;
    let locale = db.locale().to_string();

    let closed = tokio::task::spawn_blocking(move || db.close())
        .await
        .map_err(|err| anyhow!("database close task failed: {err}"))?;

    let Some(path) = closed else {
        warn!("Locale {locale} cleared but still open elsewhere; files kept");
        return Ok(false);
    };

    for file in database_files(&path) {
        if file.exists() {
            std::fs::remove_file(&file)
                .with_context(|| format!("failed to remove {}", file.display()))?;
        }
    }
    info!("Locale {locale} destroyed");
    Ok(true)
}

fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<HabitatError>(),
        Some(HabitatError::NotFound { .. })
    )
}

fn database_files(path: &Path) -> Vec<PathBuf> {
    let mut files = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        files.push(PathBuf::from(name));
    }
    files
}
