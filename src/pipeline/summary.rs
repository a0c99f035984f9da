//! Summarization of cached extraction text into a titled document.

use std::path::PathBuf;

use regex::Regex;

use crate::config::Settings;
use crate::models::{Document, PageText};
use crate::providers::{try_providers, ChatProvider, ChatRequest};

use super::PipelineError;

/// Title used when nothing usable can be pulled out of the response.
const DEFAULT_TITLE: &str = "Untitled Document";

/// Outcome of one summary run.
#[derive(Debug, Clone)]
pub struct SummaryReport {
    pub title: String,
    pub path: PathBuf,
}

pub struct SummaryGenerator {
    settings: Settings,
}

impl SummaryGenerator {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Fold the extraction cache into one markdown document.
    ///
    /// Requires a prior extract run. On success the document lands under
    /// `output/<title>/<title>.md` (an existing folder with the same title
    /// is overwritten) and the temp staging area is cleaned.
    pub async fn run(
        &self,
        providers: &[Box<dyn ChatProvider>],
    ) -> Result<SummaryReport, PipelineError> {
        let cache = self.read_cache()?;
        let source = render_source(&cache);

        let request = ChatRequest::text(summary_prompt(&source));
        let response = try_providers(providers, &request).await?;

        let title = extract_title(&response);
        let content = strip_title_marker(&response);
        let document = Document::new(title.clone(), content);
        let path = document.save(&self.settings.output_dir)?;
        tracing::info!("document written to {}", path.display());

        self.clean_staging()?;
        Ok(SummaryReport { title, path })
    }

    fn read_cache(&self) -> Result<Vec<PageText>, PipelineError> {
        let cache_path = self.settings.pages_cache_path();
        if !cache_path.exists() {
            return Err(PipelineError::ExtractRequired);
        }
        let raw = std::fs::read_to_string(&cache_path)?;
        let mut cache: Vec<PageText> =
            serde_json::from_str(&raw).map_err(|e| PipelineError::MalformedCache(e.to_string()))?;
        if cache.is_empty() {
            return Err(PipelineError::ExtractRequired);
        }
        cache.sort_by_key(|entry| entry.page);
        Ok(cache)
    }

    fn clean_staging(&self) -> Result<(), PipelineError> {
        let temp_dir = &self.settings.temp_dir;
        if temp_dir.exists() {
            std::fs::remove_dir_all(temp_dir)?;
        }
        std::fs::create_dir_all(temp_dir)?;
        Ok(())
    }
}

/// Concatenate cached page text under `## Page N` headings, ordered by
/// page number.
fn render_source(cache: &[PageText]) -> String {
    let mut source = String::new();
    for entry in cache {
        source.push_str(&format!("## Page {}\n\n{}\n\n", entry.page, entry.text));
    }
    source
}

fn summary_prompt(source: &str) -> String {
    format!(
        "Below is per-page text extracted from a scanned document. Rewrite \
         it as one coherent, well-structured markdown document. Fix obvious \
         transcription artifacts but preserve the content. Begin your \
         response with a line of exactly the form `\"title\": \"<short \
         document title>\"` followed by the document body.\n\n{}",
        source
    )
}

/// Pull a document title out of a summary response.
///
/// Preference order: explicit `"title": "..."` marker, then the first
/// non-empty line with markdown and filesystem-hostile characters
/// stripped, then a fixed default.
fn extract_title(response: &str) -> String {
    let marker = Regex::new(r#""title"\s*:\s*"([^"]+)""#).unwrap();
    if let Some(caps) = marker.captures(response) {
        let title = sanitize_title(&caps[1]);
        if !title.is_empty() {
            return title;
        }
    }

    for line in response.lines() {
        let title = sanitize_title(line);
        if !title.is_empty() {
            return title;
        }
    }

    DEFAULT_TITLE.to_string()
}

/// Strip markdown lead-in and characters that cannot appear in folder
/// names, and cap the length.
fn sanitize_title(raw: &str) -> String {
    let stripped = raw.trim_start_matches(['#', '*', '-', '>', ' ', '\t']);
    let cleaned: String = stripped
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .collect();
    let trimmed = cleaned.trim();
    trimmed.chars().take(80).collect::<String>().trim().to_string()
}

/// Remove the title marker line from the document body, if present.
fn strip_title_marker(response: &str) -> String {
    let marker = Regex::new(r#"(?m)^\s*"title"\s*:\s*"[^"]*"\s*,?\s*$"#).unwrap();
    marker.replace(response, "").trim_start().to_string()
}
