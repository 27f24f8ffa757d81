pub mod document;
pub mod envelope;

pub use document::{DocumentKey, ProjectDocument, ProjectDraft, Revision};
pub use envelope::Envelope;
