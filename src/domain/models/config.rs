use serde::{Deserialize, Serialize};

/// Main configuration structure for Abathur
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Maximum number of concurrent agents (1-100)
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retry policy configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// MCP server configurations
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,

    /// LLM substrate configurations
    #[serde(default)]
    pub substrates: SubstratesConfig,

    /// Embedding provider configuration (C2)
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Monitoring loop configuration (C13)
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Task/workflow validation pipeline configuration (C12)
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Multi-provider LLM client configuration (C3)
    #[serde(default)]
    pub llm: LlmConfig,
}

const fn default_max_agents() -> usize {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_agents: default_max_agents(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            mcp_servers: vec![],
            substrates: SubstratesConfig::default(),
            embedding: EmbeddingConfig::default(),
            monitoring: MonitoringConfig::default(),
            validation: ValidationConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

/// The four logical components spec §4.2 requires a routing entry for.
pub const REQUIRED_LLM_COMPONENTS: [&str; 4] =
    ["guardian_analysis", "conductor_analysis", "task_enrichment", "agent_prompts"];

/// One named upstream chat-completion provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LlmProviderConfig {
    /// Wire protocol this provider speaks, e.g. "anthropic", "openai".
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub model: String,
}

/// Multi-provider LLM client configuration (C3). `routing` maps each
/// logical component (`REQUIRED_LLM_COMPONENTS`) to a key in `providers`.
/// An incomplete or dangling routing table is a fatal startup error per
/// spec §4.2/§6 ("fails loudly at startup") — see `Self::validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LlmConfig {
    #[serde(default = "default_llm_providers")]
    pub providers: std::collections::HashMap<String, LlmProviderConfig>,

    #[serde(default = "default_llm_routing")]
    pub routing: std::collections::HashMap<String, String>,
}

fn default_llm_providers() -> std::collections::HashMap<String, LlmProviderConfig> {
    let mut providers = std::collections::HashMap::new();
    providers.insert(
        "default".to_string(),
        LlmProviderConfig {
            kind: "anthropic".to_string(),
            api_key: None,
            base_url: None,
            model: default_anthropic_model(),
        },
    );
    providers
}

fn default_llm_routing() -> std::collections::HashMap<String, String> {
    REQUIRED_LLM_COMPONENTS
        .iter()
        .map(|component| ((*component).to_string(), "default".to_string()))
        .collect()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: default_llm_providers(),
            routing: default_llm_routing(),
        }
    }
}

impl LlmConfig {
    /// Every required component must route to a provider that exists.
    /// Returns the first missing/dangling component found, if any.
    pub fn validate(&self) -> Result<(), String> {
        for component in REQUIRED_LLM_COMPONENTS {
            let Some(provider_key) = self.routing.get(component) else {
                return Err(format!("LLM routing table has no entry for required component '{component}'"));
            };
            if !self.providers.contains_key(provider_key) {
                return Err(format!(
                    "LLM routing table routes '{component}' to undefined provider '{provider_key}'"
                ));
            }
        }
        Ok(())
    }

    /// Resolve the provider config for a logical component.
    pub fn provider_for(&self, component: &str) -> Option<&LlmProviderConfig> {
        self.routing.get(component).and_then(|key| self.providers.get(key))
    }
}

/// Embedding client configuration (C2). When `provider` is unreachable and
/// `dedup_mandatory` is false, deduplication is silently skipped rather than
/// failing task creation (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmbeddingConfig {
    /// "openai" is the only provider shipped; others can be added by
    /// implementing `EmbeddingProvider`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Vector dimension this provider returns (text-embedding-3-small = 1536).
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Cosine-similarity threshold above which two task descriptions in the
    /// same (workflow, phase) are considered duplicates.
    #[serde(default = "default_dedup_threshold")]
    pub dedup_similarity_threshold: f32,

    /// If true, startup fails when the embedding provider is unreachable
    /// instead of degrading to "dedup skipped" (spec §6 exit codes).
    #[serde(default)]
    pub dedup_mandatory: bool,
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}

const fn default_embedding_dimension() -> usize {
    1536
}

const fn default_dedup_threshold() -> f32 {
    0.92
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            dimension: default_embedding_dimension(),
            api_key: None,
            dedup_similarity_threshold: default_dedup_threshold(),
            dedup_mandatory: false,
        }
    }
}

/// Monitoring loop configuration (C13), see spec §4.8.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MonitoringConfig {
    /// Cycle period in seconds.
    #[serde(default = "default_cycle_seconds")]
    pub cycle_seconds: u64,

    /// Minimum agent age before it is eligible for Guardian analysis.
    #[serde(default = "default_guardian_min_agent_age_seconds")]
    pub guardian_min_agent_age_seconds: i64,

    /// Grace window after process start during which no agent is reaped as
    /// orphaned.
    #[serde(default = "default_orphan_grace_seconds")]
    pub orphan_grace_seconds: i64,

    /// Maximum Guardian analyses run concurrently within one cycle.
    #[serde(default = "default_monitoring_max_concurrent")]
    pub max_concurrent: usize,

    /// Minimum cosine similarity for Conductor to flag a duplicate pair.
    #[serde(default = "default_duplicate_similarity_threshold")]
    pub duplicate_similarity_threshold: f32,

    /// Number of prior Guardian trajectory summaries fed into each analysis.
    #[serde(default = "default_guardian_history_k")]
    pub guardian_history_k: usize,

    /// Lines of session scrollback captured for Guardian context.
    #[serde(default = "default_guardian_scrollback_lines")]
    pub guardian_scrollback_lines: usize,

    /// Diagnostic spawner configuration (C11).
    #[serde(default)]
    pub diagnostic: DiagnosticConfig,
}

const fn default_cycle_seconds() -> u64 {
    60
}

const fn default_guardian_min_agent_age_seconds() -> i64 {
    60
}

const fn default_orphan_grace_seconds() -> i64 {
    120
}

const fn default_monitoring_max_concurrent() -> usize {
    5
}

const fn default_duplicate_similarity_threshold() -> f32 {
    0.8
}

const fn default_guardian_history_k() -> usize {
    10
}

const fn default_guardian_scrollback_lines() -> usize {
    200
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            cycle_seconds: default_cycle_seconds(),
            guardian_min_agent_age_seconds: default_guardian_min_agent_age_seconds(),
            orphan_grace_seconds: default_orphan_grace_seconds(),
            max_concurrent: default_monitoring_max_concurrent(),
            duplicate_similarity_threshold: default_duplicate_similarity_threshold(),
            guardian_history_k: default_guardian_history_k(),
            guardian_scrollback_lines: default_guardian_scrollback_lines(),
            diagnostic: DiagnosticConfig::default(),
        }
    }
}

/// Diagnostic agent spawner configuration (C11), see spec §4.11.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DiagnosticConfig {
    #[serde(default = "default_diagnostic_cooldown_seconds")]
    pub cooldown_seconds: i64,

    #[serde(default = "default_min_stuck_time_seconds")]
    pub min_stuck_time_seconds: i64,

    #[serde(default = "default_max_tasks_per_run")]
    pub max_tasks_per_run: usize,

    /// Number of recent completed/failed agents fed into diagnostic context.
    #[serde(default = "default_diagnostic_history_n")]
    pub history_n: usize,
}

const fn default_diagnostic_cooldown_seconds() -> i64 {
    60
}

const fn default_min_stuck_time_seconds() -> i64 {
    60
}

const fn default_max_tasks_per_run() -> usize {
    5
}

const fn default_diagnostic_history_n() -> usize {
    15
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: default_diagnostic_cooldown_seconds(),
            min_stuck_time_seconds: default_min_stuck_time_seconds(),
            max_tasks_per_run: default_max_tasks_per_run(),
            history_n: default_diagnostic_history_n(),
        }
    }
}

/// Task/workflow validation pipeline configuration (C12), see spec §4.12.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ValidationConfig {
    /// Maximum `needs_work -> in_progress` iterations before a task is left
    /// `needs_work` for a human to intervene.
    #[serde(default = "default_max_validation_iterations")]
    pub max_iterations: u32,

    /// How long a ticket approval RPC call blocks before timing out.
    #[serde(default = "default_approval_timeout_seconds")]
    pub approval_timeout_seconds: u64,

    /// Safety rail: bumped tasks may never push active agents above this
    /// multiple of `max_agents` (spec §9 Open Questions).
    #[serde(default = "default_bump_safety_multiplier")]
    pub bump_safety_multiplier: usize,

    /// Weighting of the semantic term in hybrid ticket search (spec §4.6).
    #[serde(default = "default_hybrid_semantic_weight")]
    pub hybrid_search_semantic_weight: f32,
}

const fn default_max_validation_iterations() -> u32 {
    10
}

const fn default_approval_timeout_seconds() -> u64 {
    1800
}

const fn default_bump_safety_multiplier() -> usize {
    2
}

const fn default_hybrid_semantic_weight() -> f32 {
    0.7
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_validation_iterations(),
            approval_timeout_seconds: default_approval_timeout_seconds(),
            bump_safety_multiplier: default_bump_safety_multiplier(),
            hybrid_search_semantic_weight: default_hybrid_semantic_weight(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".abathur/abathur.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            retention_days: default_retention_days(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// Requests per second allowed
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Burst size for token bucket
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

const fn default_requests_per_second() -> f64 {
    10.0
}

const fn default_burst_size() -> u32 {
    20
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    10000
}

const fn default_max_backoff_ms() -> u64 {
    300_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// MCP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct McpServerConfig {
    /// Server name
    pub name: String,

    /// Command to execute
    pub command: String,

    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables
    #[serde(default)]
    pub env: std::collections::HashMap<String, String>,
}

/// LLM Substrates configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SubstratesConfig {
    /// Default substrate to use if agent type has no mapping
    #[serde(default = "default_substrate")]
    pub default_substrate: String,

    /// Enabled substrate types
    #[serde(default = "default_enabled_substrates")]
    pub enabled: Vec<String>,

    /// Claude Code substrate configuration
    #[serde(default)]
    pub claude_code: ClaudeCodeSubstrateConfig,

    /// Anthropic API substrate configuration
    #[serde(default)]
    pub anthropic_api: AnthropicApiSubstrateConfig,

    /// Agent type to substrate mappings
    /// Maps agent type patterns to specific substrates
    #[serde(default)]
    pub agent_mappings: std::collections::HashMap<String, String>,
}

fn default_substrate() -> String {
    "claude-code".to_string()
}

fn default_enabled_substrates() -> Vec<String> {
    vec!["claude-code".to_string()]
}

impl Default for SubstratesConfig {
    fn default() -> Self {
        Self {
            default_substrate: default_substrate(),
            enabled: default_enabled_substrates(),
            claude_code: ClaudeCodeSubstrateConfig::default(),
            anthropic_api: AnthropicApiSubstrateConfig::default(),
            agent_mappings: std::collections::HashMap::new(),
        }
    }
}

/// Claude Code substrate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClaudeCodeSubstrateConfig {
    /// Path to claude CLI executable
    #[serde(default = "default_claude_path")]
    pub claude_path: String,

    /// Working directory for claude execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Default timeout in seconds
    #[serde(default = "default_claude_timeout")]
    pub timeout_secs: u64,
}

fn default_claude_path() -> String {
    "claude".to_string()
}

fn default_claude_timeout() -> u64 {
    300
}

impl Default for ClaudeCodeSubstrateConfig {
    fn default() -> Self {
        Self {
            claude_path: default_claude_path(),
            working_dir: None,
            timeout_secs: default_claude_timeout(),
        }
    }
}

/// Anthropic API substrate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AnthropicApiSubstrateConfig {
    /// Enable Anthropic API substrate
    #[serde(default)]
    pub enabled: bool,

    /// API key (can also be set via ANTHROPIC_API_KEY env var)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model to use
    #[serde(default = "default_anthropic_model")]
    pub model: String,

    /// Base URL for API (for testing/proxies)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_anthropic_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

impl Default for AnthropicApiSubstrateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            model: default_anthropic_model(),
            base_url: None,
        }
    }
}
