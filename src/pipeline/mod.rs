//! Two-stage document pipeline: batch text extraction, then summarization.

pub mod extract;
pub mod summary;

use thiserror::Error;

use crate::deck::DeckError;
use crate::providers::ProviderError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no pages to process")]
    NothingToProcess,

    #[error("no extracted text found; run extract first")]
    ExtractRequired,

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("deck error: {0}")]
    Deck(#[from] DeckError),

    #[error("extraction cache is malformed: {0}")]
    MalformedCache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
