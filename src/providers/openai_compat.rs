//! OpenAI-compatible chat provider (LM Studio and similar local servers).

use std::time::Duration;

use async_trait::async_trait;

use super::{build_messages, ChatCompletionResponse, ChatProvider, ChatRequest, ProviderError};

/// Provider speaking the OpenAI `/chat/completions` wire format.
pub struct OpenAiCompatProvider {
    name: String,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        endpoint: String,
        model: String,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            name: name.into(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            api_key,
            client,
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let payload = serde_json::json!({
            "model": self.model,
            "messages": build_messages(request),
            "stream": false,
        });

        tracing::debug!(
            provider = %self.name,
            model = %self.model,
            images = request.images.len(),
            "sending chat request"
        );

        let mut req = self.client.post(&url).json(&payload);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        parsed.into_content()
    }
}

/// Keep error bodies short enough to log.
fn truncate_body(body: &str) -> String {
    const MAX: usize = 500;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trailing_slash_stripped() {
        let provider = OpenAiCompatProvider::new(
            "lmstudio",
            "http://localhost:1234/v1/".to_string(),
            "gemma-3-12b-it".to_string(),
            None,
            60,
        );
        assert_eq!(provider.endpoint, "http://localhost:1234/v1");
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("short"), "short");
        let long = "x".repeat(600);
        let truncated = truncate_body(&long);
        assert!(truncated.len() < 600);
        assert!(truncated.ends_with("..."));
    }
}
