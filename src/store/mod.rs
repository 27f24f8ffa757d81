//! The local store: every save lands here first, whatever the state of the network.
//!
//! One SQLite database per locale, opened lazily and kept open for the life of the store.

pub mod address;
#[cfg(feature = "desktop")]
pub mod commands;

use std::{collections::HashMap, path::PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::db::{transport, Database, LocaleInfo, ReplicationReport, WriteReceipt};
use crate::error::{HabitatError, Result};
use crate::merge::stamp_save;
use crate::models::{DocumentKey, Envelope, ProjectDocument, ProjectDraft, Revision};

pub use address::LocaleAddress;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Clone)]
pub struct LocaleHandle {
    locale: String,
    db: Database,
}

impl LocaleHandle {
    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn key(&self, project: &str) -> DocumentKey {
        DocumentKey::new(self.locale.clone(), project)
    }
}

pub struct LocalStore {
    data_dir: PathBuf,
    open: Mutex<HashMap<String, Database>>,
}

impl LocalStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Opens, creating on first use, the database of a local locale.
    ///
    /// Network addresses are refused: the store only ever holds local copies.
    pub async fn open(&self, locale: &str) -> Result<LocaleHandle> {
        let name = local_name(locale, "opened")?;

        let mut open = self.open.lock().await;
        if let Some(db) = open.get(&name) {
            return Ok(LocaleHandle {
                locale: name,
                db: db.clone(),
            });
        }

        let db = transport::open_locale(&self.data_dir, &name).await?;
        open.insert(name.clone(), db.clone());
        log_info!("Opened locale {name}");

        Ok(LocaleHandle { locale: name, db })
    }

    pub async fn status(&self, handle: &LocaleHandle) -> Result<LocaleInfo> {
        Ok(handle.db.info().await?)
    }

    pub async fn get(&self, handle: &LocaleHandle, id: &str) -> Result<ProjectDocument> {
        Ok(handle.db.get_document(id).await?)
    }

    /// The stored payload of a project, wrapped for the UI.
    pub async fn load_project(&self, handle: &LocaleHandle, id: &str) -> Result<Envelope<Value>> {
        let doc = self.get(handle, id).await?;
        Ok(Envelope::success(format!("loaded {}", doc.key()), doc.data))
    }

    /// Create-or-update by id.
    ///
    /// An existing document goes through `merge` and is written against the revision that
    /// was read, so a concurrent write in between surfaces as `StaleWrite`. A missing one is
    /// created from `initial`. Only `NotFound` selects the create path; any other read
    /// failure is returned.
    pub async fn upsert<F>(
        &self,
        handle: &LocaleHandle,
        id: &str,
        initial: ProjectDraft,
        merge: F,
    ) -> Result<Envelope<WriteReceipt>>
    where
        F: FnOnce(ProjectDocument) -> ProjectDocument,
    {
        let candidate = match handle.db.get_document(id).await.map_err(HabitatError::from) {
            Ok(existing) => {
                let read_rev = existing.rev.clone();
                let mut updated = merge(existing);
                updated.id = id.to_string();
                updated.rev = read_rev;
                updated
            }
            Err(err) if err.is_not_found() => ProjectDocument::fresh(id, handle.locale(), initial),
            Err(err) => return Err(err),
        };

        let created = candidate.rev.is_none();
        let receipt = handle.db.put_document(candidate).await?;
        log_info!(
            "{} {}:{} at revision {}",
            if created { "Created" } else { "Updated" },
            handle.locale,
            receipt.id,
            receipt.rev
        );

        Ok(Envelope::success(
            format!("stored {} at {}", handle.key(&receipt.id), receipt.rev),
            receipt,
        ))
    }

    /// The application's save: upsert stamped with the moment the user saved.
    pub async fn save_project(
        &self,
        handle: &LocaleHandle,
        id: &str,
        payload: Value,
        saved_at: DateTime<Utc>,
    ) -> Result<Envelope<WriteReceipt>> {
        let initial = ProjectDraft::new(payload.clone(), saved_at);
        self.upsert(handle, id, initial, stamp_save(payload, saved_at))
            .await
    }

    /// Negotiated write of a whole document; `doc.rev` names the revision it replaces.
    pub async fn put(
        &self,
        handle: &LocaleHandle,
        mut doc: ProjectDocument,
    ) -> Result<Envelope<WriteReceipt>> {
        doc.locale = handle.locale.clone();
        let receipt = handle.db.put_document(doc).await?;
        Ok(Envelope::success(
            format!("stored {} at {}", handle.key(&receipt.id), receipt.rev),
            receipt,
        ))
    }

    /// Installs a copy exactly as given, revision included. For documents fetched from the
    /// cloud authority only.
    pub async fn put_verbatim(
        &self,
        handle: &LocaleHandle,
        mut doc: ProjectDocument,
    ) -> Result<Envelope<WriteReceipt>> {
        doc.locale = handle.locale.clone();
        let receipt = handle.db.put_verbatim(doc).await?;
        log_info!(
            "Installed {}:{} verbatim at revision {}",
            handle.locale,
            receipt.id,
            receipt.rev
        );
        Ok(Envelope::success(
            format!("installed {} at {}", handle.key(&receipt.id), receipt.rev),
            receipt,
        ))
    }

    /// Installs a cloud copy verbatim unless the local copy moved past `expected` since it
    /// was read. `None` means a local save got there first and the copy was not installed.
    pub async fn install_remote(
        &self,
        handle: &LocaleHandle,
        mut doc: ProjectDocument,
        expected: Option<Revision>,
    ) -> Result<Option<WriteReceipt>> {
        doc.locale = handle.locale.clone();
        let receipt = handle.db.put_verbatim_if(doc, expected).await?;
        match &receipt {
            Some(receipt) => log_info!(
                "Installed {}:{} from the cloud at revision {}",
                handle.locale,
                receipt.id,
                receipt.rev
            ),
            None => log_warn!("Skipped a cloud copy in {}: local copy changed", handle.locale),
        }
        Ok(receipt)
    }

    pub async fn remove(
        &self,
        handle: &LocaleHandle,
        id: &str,
        rev: &Revision,
    ) -> Result<Envelope<()>> {
        handle.db.remove_document(id, rev).await?;
        Ok(Envelope::success(format!("removed {}", handle.key(id)), ()))
    }

    pub async fn list(&self, handle: &LocaleHandle) -> Result<Vec<ProjectDocument>> {
        Ok(handle.db.list_all().await?)
    }

    /// One full pass from one local locale into another.
    pub async fn replicate(&self, from: &str, to: &str) -> Result<Envelope<ReplicationReport>> {
        let source = self.open(from).await?;
        let target = self.open(to).await?;
        let report = transport::replicate(&source.db, &target.db).await?;
        Ok(Envelope::success(
            format!(
                "replicated {} documents from {} to {}",
                report.docs_written, report.source, report.target
            ),
            report,
        ))
    }

    /// Deletes a locale's database. Refused for anything that resolves to a network address.
    pub async fn destroy(&self, locale: &str) -> Result<Envelope<()>> {
        let name = local_name(locale, "destroyed")?;

        let db = {
            let mut open = self.open.lock().await;
            match open.remove(&name) {
                Some(db) => db,
                None => transport::open_locale(&self.data_dir, &name).await?,
            }
        };

        let removed = transport::destroy(db).await?;
        if !removed {
            log_warn!("Locale {name} destroyed while other handles were still open");
        }
        Ok(Envelope::success(format!("destroyed locale {name}"), ()))
    }
}

fn local_name(identifier: &str, action: &str) -> Result<String> {
    let refuse = |address: &str| {
        HabitatError::PolicyViolation(format!(
            "{address} is a network address; only local locales may be {action}"
        ))
    };

    match LocaleAddress::parse(identifier) {
        Ok(LocaleAddress::Local(name)) => Ok(name),
        Ok(LocaleAddress::Remote(url)) => Err(refuse(url.as_str())),
        // A scheme is enough to refuse, even when the rest is malformed.
        Err(_) if address::is_network(identifier) => Err(refuse(identifier.trim())),
        Err(err) => Err(err),
    }
}
