//! The transport adapter: document operations over one SQLite database per locale.

pub mod connection;
pub mod helpers;
pub mod migrations;
pub mod models;
pub mod repositories;
pub mod transport;

pub use connection::Database;
pub use models::{LocaleInfo, ReplicationReport, WriteReceipt};
