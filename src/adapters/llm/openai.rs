//! One-shot chat-completion calls against an OpenAI-compatible Chat
//! Completions API, for providers configured with `kind = "openai"`.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::config::LlmProviderConfig;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiChatClient {
    client: Client,
    provider: LlmProviderConfig,
}

impl OpenAiChatClient {
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
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| DomainError::ExternalUnavailable("OPENAI_API_KEY not set".to_string()))
    }

    pub async fn complete(&self, system_prompt: &str, user_prompt: &str) -> DomainResult<(String, u32, u32)> {
        let base_url = self.provider.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{base_url}/chat/completions");
        let api_key = self.api_key()?;

        let mut messages = Vec::new();
        if !system_prompt.is_empty() {
            messages.push(ChatMessage { role: "system".to_string(), content: system_prompt.to_string() });
        }
        messages.push(ChatMessage { role: "user".to_string(), content: user_prompt.to_string() });

        let body = ChatRequest { model: self.provider.model.clone(), messages };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::ExternalUnavailable(format!("openai request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(DomainError::ExternalUnavailable(format!("openai returned {status}: {text}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| DomainError::SerializationError(format!("failed to parse openai response: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        Ok((text, parsed.usage.prompt_tokens, parsed.usage.completion_tokens))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> LlmProviderConfig {
        LlmProviderConfig {
            kind: "openai".to_string(),
            api_key: Some("test-key".to_string()),
            base_url: None,
            model: "gpt-4o-mini".to_string(),
        }
    }

    #[test]
    fn resolves_api_key_from_provider_config() {
        let client = OpenAiChatClient::new(provider()).unwrap();
        assert_eq!(client.api_key().unwrap(), "test-key");
    }
}
