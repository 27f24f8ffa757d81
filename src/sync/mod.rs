//! Keeping local locales and the cloud in step.

#[cfg(feature = "desktop")]
pub mod commands;
pub mod controller;
pub mod loop_worker;
pub mod reconcile;

pub use controller::SyncController;
pub use reconcile::{SyncOutcome, SyncReport, Synchronizer};
