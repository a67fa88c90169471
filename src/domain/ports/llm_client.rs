//! LLM client port (C3).
//!
//! Wraps an external chat-completion service: renders a named prompt
//! template with variables, and enforces a declared JSON response schema.
//! Routing to a concrete provider/model is resolved per logical *component*
//! (`guardian_analysis`, `conductor_analysis`, `task_enrichment`,
//! `agent_prompts`, ...) rather than per call site, so operators can send
//! cheap components to a cheap model.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::DomainResult;

/// A rendered prompt ready to send to a provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Logical component this call is made on behalf of, used for routing
    /// and cost attribution (e.g. "guardian_analysis").
    pub component: String,
    pub template_name: String,
    pub variables: Value,
    /// JSON schema the response must validate against.
    pub response_schema: Value,
}

#[derive(Debug, Clone)]
pub struct CompletionOutput {
    pub parsed: Value,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub provider: String,
    pub model: String,
}

/// Port for the multi-provider LLM client (C3).
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Render `request.template_name` with `request.variables`, call the
    /// routed provider, and validate the response against
    /// `request.response_schema`. On schema violation the implementation
    /// retries once before surfacing `ErrorKind::ValidationFailed`.
    async fn complete(&self, request: CompletionRequest) -> DomainResult<CompletionOutput>;

    /// True once the routing table has been validated for every required
    /// component. Called at startup; a `false` here is a fatal boot error
    /// per spec §6 exit codes ("LLM multi-provider config cannot be
    /// loaded").
    fn routing_is_valid(&self) -> bool;
}
