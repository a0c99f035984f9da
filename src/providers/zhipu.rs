//! Zhipu GLM chat provider.
//!
//! Zhipu keys are `id.secret` pairs; each request carries a short-lived
//! HMAC-SHA256 JWT assembled from the key rather than the key itself.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{build_messages, ChatCompletionResponse, ChatProvider, ChatRequest, ProviderError};

type HmacSha256 = Hmac<Sha256>;

/// Token lifetime in seconds.
const TOKEN_TTL_SECS: i64 = 3600;

/// Provider for Zhipu's GLM chat API.
pub struct ZhipuProvider {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ZhipuProvider {
    pub fn new(
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
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            api_key,
            client,
        }
    }
}

#[async_trait]
impl ChatProvider for ZhipuProvider {
    fn name(&self) -> &str {
        "zhipu"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ProviderError::Configuration("Zhipu API key is not set".to_string())
        })?;
        let token = generate_jwt_token(api_key)?;

        let url = format!("{}/chat/completions", self.endpoint);
        let payload = serde_json::json!({
            "model": self.model,
            "messages": build_messages(request),
        });

        tracing::debug!(
            model = %self.model,
            images = request.images.len(),
            "sending Zhipu chat request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        parsed.into_content()
    }
}

/// Build a signed JWT from an `id.secret` API key.
pub(crate) fn generate_jwt_token(api_key: &str) -> Result<String, ProviderError> {
    let mut parts = api_key.splitn(2, '.');
    let (id, secret) = match (parts.next(), parts.next()) {
        (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => (id, secret),
        _ => {
            return Err(ProviderError::Configuration(
                "Zhipu API key must have the form 'id.secret'".to_string(),
            ))
        }
    };

    let now = chrono::Utc::now().timestamp();
    let header = serde_json::json!({
        "alg": "HS256",
        "sign_type": "SIGN",
    });
    let payload = serde_json::json!({
        "api_key": id,
        "exp": now + TOKEN_TTL_SECS,
        "timestamp": now,
    });

    let encoded_header = URL_SAFE_NO_PAD.encode(header.to_string());
    let encoded_payload = URL_SAFE_NO_PAD.encode(payload.to_string());
    let signing_input = format!("{}.{}", encoded_header, encoded_payload);

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ProviderError::Configuration(e.to_string()))?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature))
}
