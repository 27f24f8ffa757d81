//! Bringing one project's local and cloud copies back together.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::cloud::{validation, CloudCommand, CloudDispatcher, LoginPolicy};
use crate::error::{HabitatError, Result};
use crate::merge::{resolve, ResolutionMode, Side};
use crate::models::{Envelope, ProjectDocument, Revision};
use crate::store::{LocaleHandle, LocalStore};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncOutcome {
    /// The cloud copy won and replaced the local one.
    PulledRemote,
    /// The local copy won and was sent up.
    PushedLocal,
    InSync,
    /// The cloud copy won, but a local save landed first; the next pass looks again.
    Superseded,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub locale: String,
    pub pulled: usize,
    pub pushed: usize,
    pub in_sync: usize,
    pub superseded: usize,
    pub failed: usize,
}

impl SyncReport {
    fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::PulledRemote => self.pulled += 1,
            SyncOutcome::PushedLocal => self.pushed += 1,
            SyncOutcome::InSync => self.in_sync += 1,
            SyncOutcome::Superseded => self.superseded += 1,
        }
    }
}

pub struct Synchronizer {
    store: Arc<LocalStore>,
    cloud: Arc<CloudDispatcher>,
    mode: ResolutionMode,
}

impl Synchronizer {
    pub fn new(store: Arc<LocalStore>, cloud: Arc<CloudDispatcher>) -> Self {
        Self {
            store,
            cloud,
            mode: ResolutionMode::default(),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn cloud(&self) -> &CloudDispatcher {
        &self.cloud
    }

    pub async fn reconcile(
        &self,
        handle: &LocaleHandle,
        project: &str,
        login: LoginPolicy,
    ) -> Result<SyncOutcome> {
        let loaded = self
            .cloud
            .dispatch_with(
                CloudCommand::LoadProjectResolved {
                    locale: handle.locale().to_string(),
                    project: project.to_string(),
                },
                login,
            )
            .await?;
        let remote = remote_copy(loaded, project)?;

        let local = match self.store.get(handle, project).await {
            Ok(doc) => Some(doc),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err),
        };

        let outcome = match (local, remote) {
            (None, None) => SyncOutcome::InSync,
            (Some(local), None) => {
                self.push(local, login).await?;
                SyncOutcome::PushedLocal
            }
            (None, Some(remote)) => self.install(handle, remote, None).await?,
            (Some(local), Some(remote)) if local.same_content(&remote) => SyncOutcome::InSync,
            (Some(local), Some(remote)) => {
                let read_rev = local.rev.clone();
                let resolution = resolve(local, remote, self.mode);
                match resolution.winner {
                    Side::Remote => self.install(handle, resolution.document, read_rev).await?,
                    Side::Local => {
                        self.push(resolution.document, login).await?;
                        SyncOutcome::PushedLocal
                    }
                }
            }
        };

        log_info!("Reconciled {}: {outcome:?}", handle.key(project));
        Ok(outcome)
    }

    /// Reconciles every project the locale holds locally or in the cloud. One project
    /// failing does not stop the others; a lapsed session stops the pass.
    pub async fn reconcile_locale(
        &self,
        handle: &LocaleHandle,
        login: LoginPolicy,
    ) -> Result<SyncReport> {
        let mut report = SyncReport {
            locale: handle.locale().to_string(),
            ..SyncReport::default()
        };

        let mut projects: BTreeSet<String> = self
            .store
            .list(handle)
            .await?
            .into_iter()
            .map(|doc| doc.id)
            .collect();
        let listed = self
            .cloud
            .dispatch_with(
                CloudCommand::ListProjects {
                    locale: handle.locale().to_string(),
                },
                login,
            )
            .await?;
        projects.extend(remote_ids(listed));

        for project in projects {
            match self.reconcile(handle, &project, login).await {
                Ok(outcome) => report.record(outcome),
                Err(err @ HabitatError::LoginRequired { .. }) => return Err(err),
                Err(err) => {
                    log_error!("Failed to reconcile {}: {err}", handle.key(&project));
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn install(
        &self,
        handle: &LocaleHandle,
        remote: ProjectDocument,
        read_rev: Option<Revision>,
    ) -> Result<SyncOutcome> {
        Ok(match self.store.install_remote(handle, remote, read_rev).await? {
            Some(_) => SyncOutcome::PulledRemote,
            None => SyncOutcome::Superseded,
        })
    }

    async fn push(&self, local: ProjectDocument, login: LoginPolicy) -> Result<Envelope> {
        let project_data = validation::project_data(&local)?;
        self.cloud
            .dispatch_with(CloudCommand::UpdateProject { project_data }, login)
            .await
    }
}

/// The document carried by a `loadProjectResolved` envelope, if the cloud has one.
fn remote_copy(envelope: Envelope, project: &str) -> Result<Option<ProjectDocument>> {
    match envelope.data {
        None | Some(Value::Null) => Ok(None),
        Some(data) if data == json!({ "no": "data" }) => Ok(None),
        Some(data) => {
            let mut doc: ProjectDocument = serde_json::from_value(data)?;
            doc.id = project.to_string();
            Ok(Some(doc))
        }
    }
}

/// Project ids from a `listProjects` envelope: an array of ids, or of documents carrying
/// `_id`, `id` or `name`. Anything else lists nothing.
fn remote_ids(envelope: Envelope) -> Vec<String> {
    let Some(Value::Array(entries)) = envelope.data else {
        return Vec::new();
    };

    entries
        .into_iter()
        .filter_map(|entry| match entry {
            Value::String(id) => Some(id),
            Value::Object(map) => ["_id", "id", "name"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::to_owned),
            _ => None,
        })
        .filter(|id| !id.is_empty())
        .collect()
}
