//! Ordered page deck with sparse order keys.
//!
//! Pages are kept in a metadata file (`deck.json`) next to the pages
//! directory; each entry carries its own order key, so inserts and deletes
//! never renumber other pages on disk. Clients address pages by 1-based
//! position in the newest-first ordering.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

use crate::models::{Page, PageKind};

/// Decrement used when computing a key below an existing neighbor.
/// Keys are millisecond timestamps, so this leaves room for further inserts.
const INSERT_STEP: i64 = 1000;

/// Errors from deck operations.
#[derive(Debug, Error)]
pub enum DeckError {
    #[error("page not found: {0}")]
    NotFound(String),

    #[error("page number {number} out of range (deck has {len} pages)")]
    OutOfRange { number: usize, len: usize },

    #[error("no free order key between adjacent pages")]
    OrderKeyExhausted,

    #[error("unsupported media type: .{0}")]
    UnsupportedMediaType(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("deck metadata is corrupt: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// The ordered collection of captured pages.
///
/// Not internally synchronized: callers serialize mutations behind one
/// lock per deck (the server wraps this in a `Mutex`).
pub struct PageDeck {
    pages_dir: PathBuf,
    meta_path: PathBuf,
    /// Sorted by order key descending (newest first).
    pages: Vec<Page>,
}

impl PageDeck {
    /// Open a deck, loading existing metadata if present. Entries whose
    /// backing file has gone missing are dropped with a warning.
    pub fn open(pages_dir: &Path, meta_path: &Path) -> Result<Self, DeckError> {
        std::fs::create_dir_all(pages_dir)?;

        let mut pages: Vec<Page> = if meta_path.exists() {
            let raw = std::fs::read_to_string(meta_path)?;
            serde_json::from_str(&raw)?
        } else {
            Vec::new()
        };

        pages.retain(|p| {
            let exists = pages_dir.join(&p.content_ref).exists();
            if !exists {
                tracing::warn!("dropping deck entry with missing file: {}", p.content_ref);
            }
            exists
        });
        pages.sort_by(|a, b| b.order_key.cmp(&a.order_key));

        Ok(Self {
            pages_dir: pages_dir.to_path_buf(),
            meta_path: meta_path.to_path_buf(),
            pages,
        })
    }

    /// Snapshot of all pages, newest first.
    pub fn list(&self) -> Vec<Page> {
        self.pages.clone()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Page at a 1-based position in the newest-first ordering.
    pub fn get(&self, page_number: usize) -> Result<&Page, DeckError> {
        if page_number < 1 || page_number > self.pages.len() {
            return Err(DeckError::OutOfRange {
                number: page_number,
                len: self.pages.len(),
            });
        }
        Ok(&self.pages[page_number - 1])
    }

    /// Absolute path of a page's backing file.
    pub fn content_path(&self, page: &Page) -> PathBuf {
        self.pages_dir.join(&page.content_ref)
    }

    /// Read a page's stored bytes.
    pub fn read_content(&self, page_number: usize) -> Result<Vec<u8>, DeckError> {
        let page = self.get(page_number)?;
        Ok(std::fs::read(self.content_path(page))?)
    }

    /// Append a page with a key greater than every existing key.
    pub fn append(
        &mut self,
        content: &[u8],
        extension: &str,
        basename: Option<&str>,
    ) -> Result<Page, DeckError> {
        let kind = PageKind::from_extension(extension)
            .ok_or_else(|| DeckError::UnsupportedMediaType(extension.to_string()))?;
        let key = self.next_append_key();
        self.store_page(key, content, extension, basename, kind)
    }

    /// Insert a page after position `page_number` in the newest-first order.
    ///
    /// `0` inserts at the front (newest), `len` appends at the back
    /// (oldest); interior inserts land strictly between neighbors.
    pub fn insert_after(
        &mut self,
        page_number: usize,
        content: &[u8],
        extension: &str,
        basename: Option<&str>,
    ) -> Result<Page, DeckError> {
        let kind = PageKind::from_extension(extension)
            .ok_or_else(|| DeckError::UnsupportedMediaType(extension.to_string()))?;
        if page_number > self.pages.len() {
            return Err(DeckError::OutOfRange {
                number: page_number,
                len: self.pages.len(),
            });
        }

        let key = if page_number == 0 {
            self.next_append_key()
        } else {
            let upper = self.pages[page_number - 1].order_key;
            let floor = self
                .pages
                .get(page_number)
                .map(|p| p.order_key)
                .unwrap_or(i64::MIN);
            self.key_below(upper, floor)?
        };

        self.store_page(key, content, extension, basename, kind)
    }

    /// Overwrite the stored bytes of a page; its order key is unchanged.
    pub fn replace(&mut self, page_number: usize, content: &[u8]) -> Result<Page, DeckError> {
        let path = {
            let page = self.get(page_number)?;
            self.content_path(page)
        };
        std::fs::write(&path, content)?;
        Ok(self.pages[page_number - 1].clone())
    }

    /// Remove a page and its backing bytes. No other page's key changes.
    pub fn delete(&mut self, page_number: usize) -> Result<Page, DeckError> {
        self.get(page_number)?;
        let page = self.pages.remove(page_number - 1);
        let path = self.pages_dir.join(&page.content_ref);
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!("failed to remove page file {}: {}", path.display(), e);
        }
        self.persist()?;
        Ok(page)
    }

    /// Remove a page addressed by its stored filename.
    pub fn delete_by_name(&mut self, filename: &str) -> Result<Page, DeckError> {
        let idx = self
            .pages
            .iter()
            .position(|p| p.content_ref == filename)
            .ok_or_else(|| DeckError::NotFound(filename.to_string()))?;
        self.delete(idx + 1)
    }

    /// Find a page by its stored filename.
    pub fn find_by_name(&self, filename: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.content_ref == filename)
    }

    /// Remove every page. Returns the number removed.
    pub fn clear(&mut self) -> Result<usize, DeckError> {
        let count = self.pages.len();
        for page in self.pages.drain(..) {
            let path = self.pages_dir.join(&page.content_ref);
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!("failed to remove page file {}: {}", path.display(), e);
            }
        }
        self.persist()?;
        Ok(count)
    }

    /// Key for a new front-of-deck page: current time, bumped past any
    /// existing key minted in the same millisecond.
    fn next_append_key(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        match self.pages.first() {
            Some(newest) if newest.order_key >= now => newest.order_key + 1,
            _ => now,
        }
    }

    /// First free key strictly below `upper` and strictly above `floor`.
    fn key_below(&self, upper: i64, floor: i64) -> Result<i64, DeckError> {
        let used: HashSet<i64> = self.pages.iter().map(|p| p.order_key).collect();
        let mut candidate = if upper.saturating_sub(INSERT_STEP) > floor {
            upper - INSERT_STEP
        } else {
            upper - 1
        };
        while candidate > floor && used.contains(&candidate) {
            candidate -= 1;
        }
        if candidate <= floor {
            return Err(DeckError::OrderKeyExhausted);
        }
        Ok(candidate)
    }

    fn store_page(
        &mut self,
        key: i64,
        content: &[u8],
        extension: &str,
        basename: Option<&str>,
        kind: PageKind,
    ) -> Result<Page, DeckError> {
        let filename = match basename.map(sanitize_filename).filter(|b| !b.is_empty()) {
            Some(base) => format!("{}_{}.{}", key, base, extension.to_ascii_lowercase()),
            None => format!("{}.{}", key, extension.to_ascii_lowercase()),
        };
        std::fs::write(self.pages_dir.join(&filename), content)?;

        let page = Page::new(key, filename, kind);
        let pos = self
            .pages
            .iter()
            .position(|p| p.order_key < key)
            .unwrap_or(self.pages.len());
        self.pages.insert(pos, page.clone());
        self.persist()?;
        Ok(page)
    }

    fn persist(&self) -> Result<(), DeckError> {
        let json = serde_json::to_string_pretty(&self.pages)?;
        std::fs::write(&self.meta_path, json)?;
        Ok(())
    }
}

/// Strip characters that are unsafe in filenames.
pub fn sanitize_filename(name: &str) -> String {
    let stem = name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(name);
    stem.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
