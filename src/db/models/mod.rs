pub mod info;

pub use info::{LocaleInfo, ReplicationReport, WriteReceipt};
