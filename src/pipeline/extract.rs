//! Batch text extraction from deck pages.
//!
//! Pages are staged into the temp directory under sequential names, sent
//! to the extraction provider chain in batches, and the per-page results
//! accumulated into `pages_cache.json`. A markdown rendition of the cache
//! is kept alongside it for inspection. Re-running replaces the cache
//! wholesale.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;

use crate::config::Settings;
use crate::deck::PageDeck;
use crate::models::{PageKind, PageText};
use crate::providers::{try_providers, ChatProvider, ChatRequest, ImageAttachment};

use super::PipelineError;

/// Outcome of one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractReport {
    /// Image pages staged for extraction.
    pub pages_total: usize,
    /// Pages whose text made it into the cache.
    pub pages_extracted: usize,
    /// Batches skipped after provider or parse failure.
    pub batches_failed: usize,
}

/// One staged page: its number in the run plus the staged file path.
pub struct StagedPage {
    number: u32,
    path: PathBuf,
    extension: String,
}

pub struct BatchExtractor {
    settings: Settings,
}

impl BatchExtractor {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Run extraction over previously staged pages.
    ///
    /// Staging is a separate step so the deck is only needed while the
    /// pages are copied out; the provider calls here run against the
    /// staged files alone. Failed batches are logged and skipped; the run
    /// only errors when no pages were staged.
    pub async fn run(
        &self,
        staged: Vec<StagedPage>,
        providers: &[Box<dyn ChatProvider>],
    ) -> Result<ExtractReport, PipelineError> {
        if staged.is_empty() {
            return Err(PipelineError::NothingToProcess);
        }

        let batch_size = self.settings.batch_size.max(1);
        let mut cache: Vec<PageText> = Vec::new();
        let mut batches_failed = 0;

        for batch in staged.chunks(batch_size) {
            let first = batch[0].number;
            let last = batch[batch.len() - 1].number;
            match self.extract_batch(batch, providers).await {
                Ok(mut texts) => {
                    tracing::info!("extracted pages {}-{}", first, last);
                    cache.append(&mut texts);
                    self.write_cache(&cache)?;
                }
                Err(e) => {
                    tracing::warn!("batch {}-{} failed, skipping: {}", first, last, e);
                    batches_failed += 1;
                }
            }
        }

        Ok(ExtractReport {
            pages_total: staged.len(),
            pages_extracted: cache.len(),
            batches_failed,
        })
    }

    /// Copy the deck's image pages into the temp directory in list order
    /// under sequential names (`001.png`, `002.jpg`, ...). Any previous
    /// staging area and cache are discarded first.
    pub fn stage(&self, deck: &PageDeck) -> Result<Vec<StagedPage>, PipelineError> {
        let temp_dir = &self.settings.temp_dir;
        if temp_dir.exists() {
            std::fs::remove_dir_all(temp_dir)?;
        }
        std::fs::create_dir_all(temp_dir)?;

        let mut staged = Vec::new();
        for page in deck.list() {
            if page.kind != PageKind::Image {
                tracing::debug!("skipping non-image page {}", page.content_ref);
                continue;
            }
            let number = staged.len() as u32 + 1;
            let extension = page.extension().to_string();
            let path = temp_dir.join(format!("{:03}.{}", number, extension));
            std::fs::copy(deck.content_path(&page), &path)?;
            staged.push(StagedPage {
                number,
                path,
                extension,
            });
        }
        Ok(staged)
    }

    /// Send one batch and parse the per-page response sections.
    async fn extract_batch(
        &self,
        batch: &[StagedPage],
        providers: &[Box<dyn ChatProvider>],
    ) -> Result<Vec<PageText>, PipelineError> {
        let mut images = Vec::with_capacity(batch.len());
        for page in batch {
            let bytes = std::fs::read(&page.path)?;
            images.push(ImageAttachment {
                base64: BASE64.encode(&bytes),
                mime: mime_subtype(&page.extension).to_string(),
            });
        }

        let numbers: Vec<u32> = batch.iter().map(|p| p.number).collect();
        let request = ChatRequest {
            prompt: batch_prompt(&numbers),
            system: None,
            images,
        };

        let response = try_providers(providers, &request).await?;
        split_batch_text(&response, &numbers)
    }

    /// Rewrite the cache file and its markdown rendition.
    fn write_cache(&self, cache: &[PageText]) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(cache)
            .map_err(|e| PipelineError::MalformedCache(e.to_string()))?;
        std::fs::write(self.settings.pages_cache_path(), json)?;

        let mut rendition = String::new();
        for entry in cache {
            rendition.push_str(&format!("--- Page {} ---\n\n{}\n\n", entry.page, entry.text));
        }
        std::fs::write(self.settings.scratch_md_path(), rendition)?;
        Ok(())
    }
}

/// Extraction instruction for one batch of page images.
fn batch_prompt(numbers: &[u32]) -> String {
    if numbers.len() == 1 {
        format!(
            "The attached image is page {} of a document. Transcribe all \
             text in the image as markdown. Output only the transcription.",
            numbers[0]
        )
    } else {
        format!(
            "The attached images are pages {} through {} of a document, in \
             order. Transcribe all text in each image as markdown. Precede \
             each page's transcription with a line of exactly the form \
             `--- Page N ---` where N is the page number. Output nothing \
             else.",
            numbers[0],
            numbers[numbers.len() - 1]
        )
    }
}

/// Split a batch response into per-page text keyed by `--- Page N ---`
/// markers.
///
/// A single-page batch without markers is accepted whole. A multi-page
/// batch without markers cannot be attributed and is an error, as is a
/// marker for a page outside the batch.
fn split_batch_text(response: &str, numbers: &[u32]) -> Result<Vec<PageText>, PipelineError> {
    let marker = Regex::new(r"(?m)^-{3}\s*Page\s+(\d+)\s*-{3}\s*$").unwrap();
    let matches: Vec<(u32, usize, usize)> = marker
        .captures_iter(response)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number = caps.get(1)?.as_str().parse().ok()?;
            Some((number, whole.start(), whole.end()))
        })
        .collect();

    if matches.is_empty() {
        if numbers.len() == 1 {
            return Ok(vec![PageText {
                page: numbers[0],
                text: response.trim().to_string(),
            }]);
        }
        return Err(PipelineError::MalformedCache(format!(
            "response for pages {:?} has no per-page markers",
            numbers
        )));
    }

    let mut sections = Vec::with_capacity(matches.len());
    for (i, &(number, _, body_start)) in matches.iter().enumerate() {
        if !numbers.contains(&number) {
            return Err(PipelineError::MalformedCache(format!(
                "response names page {} outside batch {:?}",
                number, numbers
            )));
        }
        let body_end = matches
            .get(i + 1)
            .map(|&(_, next_start, _)| next_start)
            .unwrap_or(response.len());
        sections.push(PageText {
            page: number,
            text: response[body_start..body_end].trim().to_string(),
        });
    }

    for &number in numbers {
        if !sections.iter().any(|s| s.page == number) {
            return Err(PipelineError::MalformedCache(format!(
                "response is missing page {}",
                number
            )));
        }
    }

    sections.sort_by_key(|s| s.page);
    Ok(sections)
}

fn mime_subtype(extension: &str) -> &str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "jpeg",
        _ => "png",
    }
}
