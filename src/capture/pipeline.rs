//! Persisting a requested capture into the deck.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::deck::{DeckError, PageDeck};
use crate::models::Page;

/// Errors from the capture pipeline.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The high-resolution frame never arrived or was empty.
    #[error("frame acquisition failed: {0}")]
    CaptureFailed(String),

    #[error(transparent)]
    Deck(#[from] DeckError),
}

/// Appends captured frames to the shared deck.
pub struct CapturePipeline {
    deck: Arc<Mutex<PageDeck>>,
}

impl CapturePipeline {
    pub fn new(deck: Arc<Mutex<PageDeck>>) -> Self {
        Self { deck }
    }

    /// Persist one high-resolution frame as a new page. `None` means
    /// acquisition failed; the deck is left untouched.
    pub async fn capture(&self, frame: Option<Vec<u8>>) -> Result<Page, CaptureError> {
        let frame = match frame {
            Some(bytes) if !bytes.is_empty() => bytes,
            Some(_) => {
                return Err(CaptureError::CaptureFailed("empty frame".to_string()));
            }
            None => {
                return Err(CaptureError::CaptureFailed(
                    "no frame received".to_string(),
                ));
            }
        };

        let mut deck = self.deck.lock().await;
        let page = deck.append(&frame, "png", None)?;
        tracing::info!("captured page {} ({} bytes)", page.content_ref, frame.len());
        Ok(page)
    }
}
