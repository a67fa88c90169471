//! One-shot chat-completion calls against the Anthropic Messages API.
//!
//! Distinct from `adapters::substrates::anthropic_api`, which drives a full
//! multi-turn coding session. This client exists for the LLM client port
//! (C3): single prompt in, JSON out, used by Guardian/Conductor/Diagnostic/
//! validation analyses rather than by agents.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::config::LlmProviderConfig;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicChatClient {
    client: Client,
    provider: LlmProviderConfig,
}

impl AnthropicChatClient {
    pub fn new(provider: LlmProviderConfig) -> DomainResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| DomainError::ExecutionFailed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, provider })
    }

    fn api_key(&self) -> DomainResult<String> {
        self.provider
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .ok_or_else(|| DomainError::ExternalUnavailable("ANTHROPIC_API_KEY not set".to_string()))
    }

    pub async fn complete(&self, system_prompt: &str, user_prompt: &str) -> DomainResult<(String, u32, u32)> {
        let base_url = self.provider.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{base_url}/v1/messages");
        let api_key = self.api_key()?;

        let body = MessagesRequest {
            model: self.provider.model.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system: if system_prompt.is_empty() { None } else { Some(system_prompt.to_string()) },
            messages: vec![Message { role: "user".to_string(), content: user_prompt.to_string() }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", DEFAULT_API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::ExternalUnavailable(format!("anthropic request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(DomainError::ExternalUnavailable(format!("anthropic returned {status}: {text}")));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| DomainError::SerializationError(format!("failed to parse anthropic response: {e}")))?;

        let text = parsed
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok((text, parsed.usage.input_tokens, parsed.usage.output_tokens))
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> LlmProviderConfig {
        LlmProviderConfig {
            kind: "anthropic".to_string(),
            api_key: Some("test-key".to_string()),
            base_url: None,
            model: "claude-opus-4-6-20250616".to_string(),
        }
    }

    #[test]
    fn resolves_api_key_from_provider_config() {
        let client = AnthropicChatClient::new(provider()).unwrap();
        assert_eq!(client.api_key().unwrap(), "test-key");
    }
}
