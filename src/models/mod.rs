//! Data models for pageturn.

mod document;
mod page;

pub use document::{ConversationTurn, Document, PageText};
pub use page::{Page, PageKind};
