use std::sync::Arc;

use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::reconcile::{SyncReport, Synchronizer};
use crate::cloud::LoginPolicy;
use crate::error::{HabitatError, Result};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub async fn sync_loop(
    synchronizer: Arc<Synchronizer>,
    locales: Vec<String>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // The background pass never opens a login window on its own; it waits for
                // the user to sign in through a foreground action.
                if !synchronizer.cloud().sessions().is_authenticated() {
                    log_info!("sync pass skipped: not logged in");
                    continue;
                }

                for locale in &locales {
                    match sync_locale(&synchronizer, locale, LoginPolicy::Never).await {
                        Ok(report) => log_info!(
                            "sync pass {}: {} pulled, {} pushed, {} in sync, {} superseded, {} failed",
                            report.locale,
                            report.pulled,
                            report.pushed,
                            report.in_sync,
                            report.superseded,
                            report.failed
                        ),
                        Err(err @ HabitatError::LoginRequired { .. }) => {
                            log_warn!("sync pass stopped until the next login: {err}");
                            break;
                        }
                        Err(err) => log_error!("sync pass for locale {locale} failed: {err}"),
                    }
                    if cancel_token.is_cancelled() {
                        log_warn!("sync pass interrupted by shutdown");
                        break;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("sync loop shutting down");
                break;
            }
        }
    }
}

pub async fn sync_locale(
    synchronizer: &Synchronizer,
    locale: &str,
    login: LoginPolicy,
) -> Result<SyncReport> {
    let handle = synchronizer.store().open(locale).await?;
    synchronizer.reconcile_locale(&handle, login).await
}
