use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::loop_worker::sync_loop;
use super::reconcile::Synchronizer;

/// Owns the background sync task. At most one runs at a time.
pub struct SyncController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SyncController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn start(
        &mut self,
        synchronizer: Arc<Synchronizer>,
        locales: Vec<String>,
        interval: Duration,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("sync already active");
        }
        if locales.is_empty() {
            bail!("no locales to sync");
        }

        info!(
            "Starting background sync of {} every {interval:?}",
            locales.join(", ")
        );
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sync_loop(
            synchronizer,
            locales,
            interval,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("sync loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for SyncController {
    fn default() -> Self {
        Self::new()
    }
}
