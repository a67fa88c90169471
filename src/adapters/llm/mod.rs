//! Multi-provider LLM client adapter (C3).
//!
//! Renders a named template, dispatches to the provider routed for the
//! calling component, and validates the response against the caller's JSON
//! schema, retrying once on a malformed reply before giving up.

pub mod anthropic;
pub mod openai;
pub mod schema;
pub mod templates;

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::config::LlmConfig;
use crate::domain::ports::llm_client::{CompletionOutput, CompletionRequest, LlmClient};
use crate::services::extract_json_from_response;

use anthropic::AnthropicChatClient;
use openai::OpenAiChatClient;

enum ProviderClient {
    Anthropic(AnthropicChatClient),
    OpenAi(OpenAiChatClient),
}

impl ProviderClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> DomainResult<(String, u32, u32)> {
        match self {
            ProviderClient::Anthropic(c) => c.complete(system_prompt, user_prompt).await,
            ProviderClient::OpenAi(c) => c.complete(system_prompt, user_prompt).await,
        }
    }
}

/// Routes each call to the provider configured for its logical component,
/// renders the template, and enforces the declared response schema.
pub struct MultiProviderLlmClient {
    config: LlmConfig,
    clients: HashMap<String, ProviderClient>,
}

impl MultiProviderLlmClient {
    /// Eagerly constructs one HTTP client per configured provider. Fails at
    /// construction if a provider's `kind` is unrecognized or its client
    /// cannot be built, so a broken config is caught before first use.
    pub fn new(config: LlmConfig) -> DomainResult<Self> {
        let mut clients = HashMap::with_capacity(config.providers.len());
        for (key, provider) in &config.providers {
            let client = match provider.kind.as_str() {
                "anthropic" => ProviderClient::Anthropic(AnthropicChatClient::new(provider.clone())?),
                "openai" => ProviderClient::OpenAi(OpenAiChatClient::new(provider.clone())?),
                other => {
                    return Err(DomainError::ValidationFailed(format!(
                        "unknown LLM provider kind '{other}' for provider '{key}'"
                    )))
                }
            };
            clients.insert(key.clone(), client);
        }
        Ok(Self { config, clients })
    }

    fn client_for(&self, component: &str) -> DomainResult<(&ProviderClient, &str)> {
        let provider = self
            .config
            .provider_for(component)
            .ok_or_else(|| DomainError::ExternalUnavailable(format!("no LLM provider routed for component '{component}'")))?;
        let key = self
            .config
            .routing
            .get(component)
            .map(String::as_str)
            .unwrap_or("default");
        let client = self
            .clients
            .get(key)
            .ok_or_else(|| DomainError::ExternalUnavailable(format!("LLM provider '{key}' has no client configured")))?;
        Ok((client, &provider.model))
    }
}

#[async_trait]
impl LlmClient for MultiProviderLlmClient {
    #[instrument(skip(self, request), fields(component = %request.component, template = %request.template_name))]
    async fn complete(&self, request: CompletionRequest) -> DomainResult<CompletionOutput> {
        let (client, model) = self.client_for(&request.component)?;
        let provider_key = self
            .config
            .routing
            .get(&request.component)
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        let user_prompt = templates::render(&request.template_name, &request.variables)?;
        let system_prompt = format!(
            "Respond with a single JSON object matching this schema and nothing else:\n{}",
            request.response_schema
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            let (text, input_tokens, output_tokens) = client.complete(&system_prompt, &user_prompt).await?;
            let candidate = extract_json_from_response(&text);
            let parsed: serde_json::Value = match serde_json::from_str(&candidate) {
                Ok(v) => v,
                Err(e) if attempt < 2 => {
                    warn!(error = %e, "LLM response was not valid JSON, retrying once");
                    continue;
                }
                Err(e) => return Err(DomainError::ValidationFailed(format!("LLM response was not valid JSON: {e}"))),
            };

            if let Err(violation) = schema::validate(&parsed, &request.response_schema) {
                if attempt < 2 {
                    warn!(violation = %violation, "LLM response failed schema validation, retrying once");
                    continue;
                }
                return Err(DomainError::ValidationFailed(format!(
                    "LLM response failed schema validation: {violation}"
                )));
            }

            return Ok(CompletionOutput {
                parsed,
                input_tokens,
                output_tokens,
                provider: provider_key,
                model: model.to_string(),
            });
        }
    }

    fn routing_is_valid(&self) -> bool {
        self.config.validate().is_ok()
    }
}
