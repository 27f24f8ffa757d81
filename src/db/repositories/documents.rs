//! Document operations translated onto the locale's SQLite tables.
//!
//! No timestamps and no merge rules live here: callers hand in complete documents and the
//! adapter only negotiates revisions.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_optional_datetime, to_i64, to_u64},
    models::{LocaleInfo, WriteReceipt},
};
use crate::error::HabitatError;
use crate::models::{ProjectDocument, Revision};

const NO_REVISION: &str = "none";

fn row_to_document(row: &Row) -> Result<ProjectDocument> {
    let rev: String = row.get("rev")?;
    let saved_at: Option<String> = row.get("saved_at")?;
    let data: String = row.get("data")?;

    Ok(ProjectDocument {
        id: row.get("id")?,
        rev: Some(Revision::from(rev)),
        locale: row.get("locale")?,
        owner: row.get("owner")?,
        timestamp: parse_optional_datetime(saved_at, "saved_at")?,
        data: serde_json::from_str(&data).context("failed to decode document data")?,
    })
}

fn read_document(conn: &Connection, id: &str) -> Result<Option<ProjectDocument>> {
    let mut stmt = conn.prepare(
        "SELECT id, rev, locale, owner, saved_at, data
         FROM documents
         WHERE id = ?1",
    )?;

    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_document(row)?)),
        None => Ok(None),
    }
}

fn stored_revision(conn: &Connection, id: &str) -> Result<Option<Revision>> {
    let rev: Option<String> = conn
        .query_row(
            "SELECT rev FROM documents WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(rev.map(Revision::from))
}

/// Compare-and-swap rule: the named revision must be exactly what is stored.
fn check_revision(
    id: &str,
    stored: Option<&Revision>,
    named: Option<&Revision>,
) -> std::result::Result<(), HabitatError> {
    match (stored, named) {
        (None, None) => Ok(()),
        (Some(stored), Some(named)) if stored == named => Ok(()),
        (stored, named) => Err(HabitatError::StaleWrite {
            id: id.to_string(),
            expected: named.map_or(NO_REVISION.to_string(), |rev| rev.to_string()),
            actual: stored.map_or(NO_REVISION.to_string(), |rev| rev.to_string()),
        }),
    }
}

fn write_row(conn: &Connection, doc: &ProjectDocument, rev: &Revision) -> Result<()> {
    let data = serde_json::to_string(&doc.data).context("failed to encode document data")?;

    conn.execute(
        "INSERT INTO documents (id, rev, generation, locale, owner, saved_at, data, written_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
             rev = excluded.rev,
             generation = excluded.generation,
             locale = excluded.locale,
             owner = excluded.owner,
             saved_at = excluded.saved_at,
             data = excluded.data,
             written_at = excluded.written_at",
        params![
            doc.id,
            rev.as_str(),
            to_i64(rev.generation())?,
            doc.locale,
            doc.owner,
            doc.timestamp.map(|dt| dt.to_rfc3339()),
            data,
            Utc::now().to_rfc3339(),
        ],
    )
    .with_context(|| format!("failed to write document {}", doc.id))?;

    bump_update_seq(conn)
}

fn bump_update_seq(conn: &Connection) -> Result<()> {
    conn.execute(
        "UPDATE store_meta SET value = value + 1 WHERE key = 'update_seq'",
        [],
    )
    .context("failed to advance update_seq")?;
    Ok(())
}

fn next_revision(stored: Option<&Revision>) -> Revision {
    stored.map_or_else(Revision::initial, Revision::next)
}

impl Database {
    pub async fn info(&self) -> Result<LocaleInfo> {
        let db_name = self.locale().to_string();
        let path = self.path().to_path_buf();
        self.execute(move |conn| {
            let doc_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
            let update_seq: i64 = conn.query_row(
                "SELECT value FROM store_meta WHERE key = 'update_seq'",
                [],
                |row| row.get(0),
            )?;

            Ok(LocaleInfo {
                db_name,
                doc_count: to_u64(doc_count, "doc_count")?,
                update_seq: to_u64(update_seq, "update_seq")?,
                path,
            })
        })
        .await
    }

    /// `NotFound` on a miss, so callers can tell a create path from a failed read.
    pub async fn get_document(&self, id: &str) -> Result<ProjectDocument> {
        let id = id.to_string();
        let locale = self.locale().to_string();
        self.execute(move |conn| match read_document(conn, &id)? {
            Some(doc) => Ok(doc),
            None => Err(HabitatError::NotFound { locale, id }.into()),
        })
        .await
    }

    /// Negotiated write: `doc.rev` must name the stored revision, or be `None` for a create.
    pub async fn put_document(&self, doc: ProjectDocument) -> Result<WriteReceipt> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let stored = stored_revision(&tx, &doc.id)?;
            check_revision(&doc.id, stored.as_ref(), doc.rev.as_ref())?;

            let rev = next_revision(stored.as_ref());
            write_row(&tx, &doc, &rev)?;
            tx.commit().context("failed to commit document write")?;

            Ok(WriteReceipt { id: doc.id, rev })
        })
        .await
    }

    /// Stores the document with its own revision, whatever is currently stored.
    pub async fn put_verbatim(&self, doc: ProjectDocument) -> Result<WriteReceipt> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let rev = doc.rev.clone().unwrap_or_else(Revision::initial);
            write_row(&tx, &doc, &rev)?;
            tx.commit().context("failed to commit verbatim write")?;

            Ok(WriteReceipt { id: doc.id, rev })
        })
        .await
    }

    /// Verbatim write that only lands while the stored revision is still `expected`
    /// (`None`: no stored document). Returns `None` when something else wrote first.
    pub async fn put_verbatim_if(
        &self,
        doc: ProjectDocument,
        expected: Option<Revision>,
    ) -> Result<Option<WriteReceipt>> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            if stored_revision(&tx, &doc.id)? != expected {
                return Ok(None);
            }

            let rev = doc.rev.clone().unwrap_or_else(Revision::initial);
            write_row(&tx, &doc, &rev)?;
            tx.commit().context("failed to commit verbatim write")?;

            Ok(Some(WriteReceipt { id: doc.id, rev }))
        })
        .await
    }

    /// Read-modify-write in one worker task. `update` returning `None` leaves the row alone.
    pub async fn upsert_with_fn<F>(&self, id: &str, update: F) -> Result<Option<WriteReceipt>>
    where
        F: FnOnce(Option<ProjectDocument>) -> Option<ProjectDocument> + Send + 'static,
    {
        let id = id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let existing = read_document(&tx, &id)?;
            let stored = existing.as_ref().and_then(|doc| doc.rev.clone());

            let Some(mut updated) = update(existing) else {
                return Ok(None);
            };
            updated.id = id;

            let rev = next_revision(stored.as_ref());
            write_row(&tx, &updated, &rev)?;
            tx.commit().context("failed to commit upsert")?;

            Ok(Some(WriteReceipt {
                id: updated.id,
                rev,
            }))
        })
        .await
    }

    pub async fn remove_document(&self, id: &str, rev: &Revision) -> Result<()> {
        let id = id.to_string();
        let rev = rev.clone();
        let locale = self.locale().to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let Some(stored) = stored_revision(&tx, &id)? else {
                return Err(HabitatError::NotFound { locale, id }.into());
            };
            check_revision(&id, Some(&stored), Some(&rev))?;

            tx.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
            bump_update_seq(&tx)?;
            tx.commit().context("failed to commit document removal")?;
            Ok(())
        })
        .await
    }

    pub async fn list_all(&self) -> Result<Vec<ProjectDocument>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, rev, locale, owner, saved_at, data
                 FROM documents
                 ORDER BY id ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut documents = Vec::new();
            while let Some(row) = rows.next()? {
                documents.push(row_to_document(row)?);
            }

            Ok(documents)
        })
        .await
    }

    pub async fn clear(&self) -> Result<()> {
        self.execute(|conn| {
            conn.execute_batch(
                "DELETE FROM documents;
                 UPDATE store_meta SET value = 0 WHERE key = 'update_seq';",
            )
            .context("failed to clear locale database")?;
            Ok(())
        })
        .await
    }
}
