//! Configuration management for pageturn.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default settle delay after the hand leaves the frame, in milliseconds.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

/// Default maximum number of images per extraction batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default provider request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Upload size limit for images, in megabytes.
pub const MAX_IMAGE_MB: u64 = 5;

/// Upload size limit for video, in megabytes.
pub const MAX_VIDEO_MB: u64 = 200;

/// Subdirectory holding raw page files.
const PAGES_SUBDIR: &str = "pages";

/// Subdirectory for extraction staging and caches.
const TEMP_SUBDIR: &str = "temp";

/// Subdirectory for generated documents.
const OUTPUT_SUBDIR: &str = "output";

/// A provider entry - either a single provider or a fallback chain.
///
/// Examples:
/// - `"lmstudio"` - single provider
/// - `["zhipu", "lmstudio"]` - fallback chain, tries zhipu first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderEntry {
    /// Single provider.
    Single(String),
    /// Fallback chain - tries providers in order until one succeeds.
    Chain(Vec<String>),
}

impl ProviderEntry {
    /// Get all provider names in this entry, in attempt order.
    pub fn names(&self) -> Vec<&str> {
        match self {
            ProviderEntry::Single(s) => vec![s.as_str()],
            ProviderEntry::Chain(v) => v.iter().map(|s| s.as_str()).collect(),
        }
    }

    /// Check if this is a fallback chain (multiple providers).
    #[allow(dead_code)]
    pub fn is_chain(&self) -> bool {
        matches!(self, ProviderEntry::Chain(v) if v.len() > 1)
    }
}

/// Endpoint configuration for one chat provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base endpoint URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// API key (usually supplied via the settings store instead).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Provider selection and endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Provider chain for the extraction stage.
    #[serde(default = "default_extract_chain")]
    pub extract: ProviderEntry,
    /// Provider chain for the summarization stage.
    #[serde(default = "default_summary_chain")]
    pub summary: ProviderEntry,
    /// LM Studio (OpenAI-compatible) endpoint settings.
    #[serde(default)]
    pub lmstudio: EndpointConfig,
    /// Zhipu GLM endpoint settings.
    #[serde(default)]
    pub zhipu: EndpointConfig,
}

fn default_extract_chain() -> ProviderEntry {
    ProviderEntry::Single("lmstudio".to_string())
}

fn default_summary_chain() -> ProviderEntry {
    ProviderEntry::Chain(vec!["zhipu".to_string(), "lmstudio".to_string()])
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            extract: default_extract_chain(),
            summary: default_summary_chain(),
            lmstudio: EndpointConfig::default(),
            zhipu: EndpointConfig::default(),
        }
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Directory holding raw page files.
    pub pages_dir: PathBuf,
    /// Staging directory for extraction runs.
    pub temp_dir: PathBuf,
    /// Directory for generated documents.
    pub output_dir: PathBuf,
    /// Settle delay after hand-absence before capture, in milliseconds.
    pub settle_delay_ms: u64,
    /// Maximum captures per monitoring session (0 = unlimited).
    pub max_captures: u32,
    /// Maximum images per extraction batch.
    pub batch_size: usize,
    /// Provider request timeout in seconds.
    pub request_timeout: u64,
    /// External hand-detector command (receives a frame file path,
    /// prints "true"/"false" on stdout).
    pub detector_command: Option<String>,
    /// Provider selection and endpoints.
    pub providers: ProvidersConfig,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to ~/Documents/pageturn/ for user data
        // Falls back gracefully: Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pageturn");

        Self {
            pages_dir: data_dir.join(PAGES_SUBDIR),
            temp_dir: data_dir.join(TEMP_SUBDIR),
            output_dir: data_dir.join(OUTPUT_SUBDIR),
            data_dir,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            max_captures: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
            detector_command: None,
            providers: ProvidersConfig::default(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            pages_dir: data_dir.join(PAGES_SUBDIR),
            temp_dir: data_dir.join(TEMP_SUBDIR),
            output_dir: data_dir.join(OUTPUT_SUBDIR),
            data_dir,
            ..Default::default()
        }
    }

    /// Path to the extraction cache file.
    pub fn pages_cache_path(&self) -> PathBuf {
        self.temp_dir.join("pages_cache.json")
    }

    /// Path to the scratch markdown rendition of the extraction cache.
    pub fn scratch_md_path(&self) -> PathBuf {
        self.temp_dir.join("temp.md")
    }

    /// Path to the key-value settings store.
    pub fn env_file_path(&self) -> PathBuf {
        self.data_dir.join(".env")
    }

    /// Path to the deck metadata file.
    pub fn deck_meta_path(&self) -> PathBuf {
        self.data_dir.join("deck.json")
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for (dir, label) in [
            (&self.data_dir, "data directory"),
            (&self.pages_dir, "pages directory"),
            (&self.temp_dir, "temp directory"),
            (&self.output_dir, "output directory"),
        ] {
            std::fs::create_dir_all(dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!("Failed to create {} '{}': {}", label, dir.display(), e),
                )
            })?;
        }
        Ok(())
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Settle delay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_delay_ms: Option<u64>,
    /// Maximum captures per session (0 = unlimited).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_captures: Option<u32>,
    /// Maximum images per extraction batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    /// Provider request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// External hand-detector command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector_command: Option<String>,
    /// Provider selection and endpoints.
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration, checking `PAGETURN_CONFIG`, then well-known
    /// filenames in the current directory, then the default data directory.
    pub async fn load() -> Self {
        if let Ok(path) = std::env::var("PAGETURN_CONFIG") {
            if let Ok(config) = Self::load_from_path(Path::new(&path)).await {
                return config;
            }
        }

        let default_data_dir = Settings::default().data_dir;
        for dir in [PathBuf::from("."), default_data_dir] {
            for name in ["pageturn.toml", "pageturn.yaml", "pageturn.json"] {
                let candidate = dir.join(name);
                if candidate.exists() {
                    if let Ok(config) = Self::load_from_path(&candidate).await {
                        return config;
                    }
                }
            }
        }

        Self::default()
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML, and YAML formats based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply configuration to settings, resolving relative paths against
    /// the config file's directory.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref data_dir) = self.data_dir {
            let base = self
                .source_path
                .as_ref()
                .and_then(|p| p.parent())
                .unwrap_or_else(|| Path::new("."));
            let path = Path::new(data_dir);
            let resolved = if path.is_absolute() {
                path.to_path_buf()
            } else {
                base.join(path)
            };
            *settings = Settings::with_data_dir(resolved);
        }
        if let Some(delay) = self.settle_delay_ms {
            settings.settle_delay_ms = delay;
        }
        if let Some(max) = self.max_captures {
            settings.max_captures = max;
        }
        if let Some(size) = self.batch_size {
            settings.batch_size = size.max(1);
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(ref cmd) = self.detector_command {
            settings.detector_command = Some(cmd.clone());
        }
        settings.providers = self.providers.clone();
    }
}

/// Load settings: config file, then CLI data-dir override on top.
pub async fn load_settings(data_dir: Option<PathBuf>) -> Settings {
    let config = Config::load().await;
    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    if let Some(dir) = data_dir {
        let providers = settings.providers.clone();
        let mut overridden = Settings::with_data_dir(dir);
        overridden.settle_delay_ms = settings.settle_delay_ms;
        overridden.max_captures = settings.max_captures;
        overridden.batch_size = settings.batch_size;
        overridden.request_timeout = settings.request_timeout;
        overridden.detector_command = settings.detector_command.clone();
        overridden.providers = providers;
        settings = overridden;
    }
    settings
}
