//! Key-value settings store for provider credentials and endpoints.
//!
//! Backed by a `.env`-style file in the data directory. Rewrites preserve
//! comments, blank lines, and unknown entries; values containing spaces or
//! quotes are quoted on the way out and unquoted on the way in.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;

/// Key whose value must look like a Zhipu API key (`id.secret`).
pub const ZHIPU_API_KEY: &str = "ZHIPUAI_API_KEY";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid settings key: {0}")]
    InvalidKey(String),

    #[error("Zhipu API key must contain a '.' separating id and secret")]
    MalformedZhipuKey,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Comment-preserving key-value store.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all entries. A missing file is an empty store.
    pub fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let mut settings = BTreeMap::new();
        if !self.path.exists() {
            return Ok(settings);
        }

        let entry_re = Regex::new(r"^([A-Za-z0-9_]+)=(.*)$").unwrap();
        let contents = std::fs::read_to_string(&self.path)?;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(caps) = entry_re.captures(line) {
                let value = caps[2].trim_matches(|c| c == '"' || c == '\'');
                settings.insert(caps[1].to_string(), value.to_string());
            }
        }
        Ok(settings)
    }

    /// Look up one value.
    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    /// Update entries, keeping existing comments and formatting. New keys
    /// are appended at the end.
    pub fn set_many(&self, updates: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let key_re = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
        for key in updates.keys() {
            if !key_re.is_match(key) {
                return Err(StoreError::InvalidKey(key.clone()));
            }
        }
        if let Some(key) = updates.get(ZHIPU_API_KEY) {
            if !key.is_empty() && !key.contains('.') {
                return Err(StoreError::MalformedZhipuKey);
            }
        }

        let entry_re = Regex::new(r"^([A-Za-z0-9_]+)=").unwrap();
        let mut lines: Vec<String> = Vec::new();
        let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();

        if self.path.exists() {
            let contents = std::fs::read_to_string(&self.path)?;
            for line in contents.lines() {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    lines.push(trimmed.to_string());
                    continue;
                }
                match entry_re.captures(trimmed) {
                    Some(caps) => {
                        let key = caps.get(1).unwrap().as_str();
                        match updates.get_key_value(key) {
                            Some((key, value)) => {
                                seen.insert(key.as_str());
                                lines.push(format!("{}={}", key, quote_value(value)));
                            }
                            None => lines.push(trimmed.to_string()),
                        }
                    }
                    None => lines.push(trimmed.to_string()),
                }
            }
        }

        for (key, value) in updates {
            if !seen.contains(key.as_str()) {
                lines.push(format!("{}={}", key, quote_value(value)));
            }
        }

        let mut body = lines.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        std::fs::write(&self.path, body)?;
        Ok(())
    }
}

/// Quote values containing whitespace, quotes, or comment markers.
fn quote_value(value: &str) -> String {
    if value
        .chars()
        .any(|c| c.is_whitespace() || c == '"' || c == '\'' || c == '#')
    {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}
