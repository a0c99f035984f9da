//! Page model: one captured still image or video segment plus its order key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Media kind of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Image,
    Video,
}

impl PageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Classify a file extension. Returns None for unsupported extensions.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "png" => Some(Self::Image),
            "mp4" => Some(Self::Video),
            _ => None,
        }
    }
}

/// One page in the deck.
///
/// The order key is a millisecond timestamp assigned at append time and
/// stored here, never parsed back out of the storage filename. Page numbers
/// are positional: page N is the N-th entry when the deck is sorted by
/// order key descending (newest first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Strictly-unique ordering key (larger = newer).
    pub order_key: i64,
    /// Filename of the stored bytes inside the pages directory.
    pub content_ref: String,
    /// Media kind.
    pub kind: PageKind,
    /// When this page entered the deck.
    pub created_at: DateTime<Utc>,
}

impl Page {
    pub fn new(order_key: i64, content_ref: String, kind: PageKind) -> Self {
        Self {
            order_key,
            content_ref,
            kind,
            created_at: Utc::now(),
        }
    }

    /// File extension of the stored bytes.
    pub fn extension(&self) -> &str {
        self.content_ref.rsplit('.').next().unwrap_or("png")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(PageKind::from_extension("jpg"), Some(PageKind::Image));
        assert_eq!(PageKind::from_extension("JPEG"), Some(PageKind::Image));
        assert_eq!(PageKind::from_extension("png"), Some(PageKind::Image));
        assert_eq!(PageKind::from_extension("mp4"), Some(PageKind::Video));
        assert_eq!(PageKind::from_extension("gif"), None);
        assert_eq!(PageKind::from_extension("pdf"), None);
    }

    #[test]
    fn test_page_extension() {
        let page = Page::new(1, "1718000000000.png".to_string(), PageKind::Image);
        assert_eq!(page.extension(), "png");
    }
}
