//! Chat providers for text extraction and summarization.
//!
//! Providers implement one trait; fallback is an explicit ordered list
//! walked by [`try_providers`], never exception-driven control flow.

mod openai_compat;
mod zhipu;

pub use openai_compat::OpenAiCompatProvider;
pub use zhipu::ZhipuProvider;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::{ProviderEntry, Settings};
use crate::settings_store::SettingsStore;

/// One image sent along with a prompt.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    /// Base64-encoded bytes.
    pub base64: String,
    /// MIME subtype ("jpeg", "png").
    pub mime: String,
}

/// A single provider request: prompt plus optional image attachments.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub images: Vec<ImageAttachment>,
}

impl ChatRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

/// Errors from provider calls.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("provider returned empty content")]
    EmptyResponse,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("all providers failed: {}", format_failures(.0))]
    AllProvidersFailed(Vec<(String, String)>),
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("{}: {}", name, err))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Issue one request, returning the response text.
    async fn chat(&self, request: &ChatRequest) -> Result<String, ProviderError>;
}

/// Attempt each provider in order, returning the first non-empty success.
pub async fn try_providers(
    providers: &[Box<dyn ChatProvider>],
    request: &ChatRequest,
) -> Result<String, ProviderError> {
    let mut failures = Vec::new();
    for provider in providers {
        match provider.chat(request).await {
            Ok(content) if !content.trim().is_empty() => {
                tracing::debug!("provider {} succeeded", provider.name());
                return Ok(content);
            }
            Ok(_) => {
                tracing::warn!("provider {} returned empty content", provider.name());
                failures.push((
                    provider.name().to_string(),
                    ProviderError::EmptyResponse.to_string(),
                ));
            }
            Err(e) => {
                tracing::warn!("provider {} failed: {}", provider.name(), e);
                failures.push((provider.name().to_string(), e.to_string()));
            }
        }
    }
    Err(ProviderError::AllProvidersFailed(failures))
}

/// Chat-completions response shape shared by both wire formats.
#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoiceMessage {
    content: String,
}

impl ChatCompletionResponse {
    /// Content of the first choice; empty content is an error.
    pub(crate) fn into_content(self) -> Result<String, ProviderError> {
        let content = self
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(content)
    }
}

/// Build the user message content: plain string for text-only requests, a
/// content array with data-URI image parts otherwise.
pub(crate) fn user_content(request: &ChatRequest) -> serde_json::Value {
    if request.images.is_empty() {
        return serde_json::Value::String(request.prompt.clone());
    }
    let mut parts = vec![serde_json::json!({
        "type": "text",
        "text": request.prompt,
    })];
    for image in &request.images {
        parts.push(serde_json::json!({
            "type": "image_url",
            "image_url": {
                "url": format!("data:image/{};base64,{}", image.mime, image.base64),
            }
        }));
    }
    serde_json::Value::Array(parts)
}

/// Build the messages array with an optional system turn.
pub(crate) fn build_messages(request: &ChatRequest) -> serde_json::Value {
    let mut messages = Vec::new();
    if let Some(ref system) = request.system {
        messages.push(serde_json::json!({
            "role": "system",
            "content": system,
        }));
    }
    messages.push(serde_json::json!({
        "role": "user",
        "content": user_content(request),
    }));
    serde_json::Value::Array(messages)
}

/// Resolve a provider chain from config plus settings-store overrides.
///
/// Misconfiguration of an individual provider (for example a missing API
/// key) is not reported here: the provider surfaces it when called, so a
/// fallback chain can still recover.
pub fn build_chain(
    entry: &ProviderEntry,
    settings: &Settings,
    store: &SettingsStore,
) -> Result<Vec<Box<dyn ChatProvider>>, ProviderError> {
    let overrides = store
        .read_all()
        .map_err(|e| ProviderError::Configuration(e.to_string()))?;
    let lookup = |key: &str| overrides.get(key).filter(|v| !v.is_empty()).cloned();

    let mut providers: Vec<Box<dyn ChatProvider>> = Vec::new();
    for name in entry.names() {
        match name {
            "lmstudio" => {
                let cfg = &settings.providers.lmstudio;
                providers.push(Box::new(OpenAiCompatProvider::new(
                    "lmstudio",
                    lookup("LMSTUDIO_API_ENDPOINT")
                        .or_else(|| cfg.endpoint.clone())
                        .unwrap_or_else(|| "http://localhost:1234/v1".to_string()),
                    lookup("LMSTUDIO_MODEL_NAME")
                        .or_else(|| cfg.model.clone())
                        .unwrap_or_else(|| "gemma-3-12b-it".to_string()),
                    lookup("LMSTUDIO_API_KEY").or_else(|| cfg.api_key.clone()),
                    settings.request_timeout,
                )));
            }
            "zhipu" => {
                let cfg = &settings.providers.zhipu;
                providers.push(Box::new(ZhipuProvider::new(
                    lookup("ZHIPUAI_API_ENDPOINT")
                        .or_else(|| cfg.endpoint.clone())
                        .unwrap_or_else(|| "https://open.bigmodel.cn/api/paas/v4".to_string()),
                    lookup("ZHIPUAI_MODEL_NAME")
                        .or_else(|| cfg.model.clone())
                        .unwrap_or_else(|| "glm-4v-plus-0111".to_string()),
                    lookup("ZHIPUAI_API_KEY").or_else(|| cfg.api_key.clone()),
                    settings.request_timeout,
                )));
            }
            other => {
                return Err(ProviderError::Configuration(format!(
                    "unknown provider '{}'",
                    other
                )));
            }
        }
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedProvider {
        name: &'static str,
        result: Result<String, &'static str>,
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<String, ProviderError> {
            match &self.result {
                Ok(content) => Ok(content.clone()),
                Err(msg) => Err(ProviderError::Api {
                    status: 500,
                    body: msg.to_string(),
                }),
            }
        }
    }

    fn boxed(name: &'static str, result: Result<&str, &'static str>) -> Box<dyn ChatProvider> {
        Box::new(ScriptedProvider {
            name,
            result: result.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn test_fallback_uses_second_on_primary_failure() {
        let providers = vec![
            boxed("primary", Err("boom")),
            boxed("secondary", Ok("document body")),
        ];
        let content = try_providers(&providers, &ChatRequest::text("hi"))
            .await
            .unwrap();
        assert_eq!(content, "document body");
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let providers = vec![
            boxed("primary", Ok("from primary")),
            boxed("secondary", Ok("from secondary")),
        ];
        let content = try_providers(&providers, &ChatRequest::text("hi"))
            .await
            .unwrap();
        assert_eq!(content, "from primary");
    }

    #[tokio::test]
    async fn test_empty_content_counts_as_failure() {
        let providers = vec![boxed("primary", Ok("  ")), boxed("secondary", Ok("real"))];
        let content = try_providers(&providers, &ChatRequest::text("hi"))
            .await
            .unwrap();
        assert_eq!(content, "real");
    }

    #[tokio::test]
    async fn test_all_failed_aggregates() {
        let providers = vec![boxed("a", Err("one")), boxed("b", Err("two"))];
        let err = try_providers(&providers, &ChatRequest::text("hi"))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("a:"));
        assert!(msg.contains("b:"));
    }

    #[test]
    fn test_user_content_plain_text() {
        let req = ChatRequest::text("hello");
        assert_eq!(user_content(&req), serde_json::json!("hello"));
    }

    #[test]
    fn test_user_content_with_images() {
        let req = ChatRequest {
            prompt: "read these".to_string(),
            system: None,
            images: vec![ImageAttachment {
                base64: "QUJD".to_string(),
                mime: "png".to_string(),
            }],
        };
        let content = user_content(&req);
        let parts = content.as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(
            parts[1]["image_url"]["url"],
            "data:image/png;base64,QUJD"
        );
    }

    #[test]
    fn test_response_content_extraction() {
        let resp: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": "extracted"}}]}"#,
        )
        .unwrap();
        assert_eq!(resp.into_content().unwrap(), "extracted");

        let empty: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            empty.into_content(),
            Err(ProviderError::EmptyResponse)
        ));
    }

    #[test]
    fn test_build_chain_rejects_unknown_provider() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::with_data_dir(dir.path().to_path_buf());
        let store = SettingsStore::new(dir.path().join(".env"));
        let entry = ProviderEntry::Single("mystery".to_string());
        assert!(matches!(
            build_chain(&entry, &settings, &store),
            Err(ProviderError::Configuration(_))
        ));
    }

    #[test]
    fn test_build_chain_resolves_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::with_data_dir(dir.path().to_path_buf());
        let store = SettingsStore::new(dir.path().join(".env"));
        let chain = build_chain(&settings.providers.summary.clone(), &settings, &store).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].name(), "zhipu");
        assert_eq!(chain[1].name(), "lmstudio");
    }
}
