//! Core types shared by the router, the session layer and the engine.
//!
//! - [`ConversationId`]: identifies one routed conversation
//! - [`AgentConfig`]: engine configuration
//! - [`RetryConfig`]: backoff for transient reasoning failures
//! - [`TokenUsage`]: token consumption statistics
//! - [`ActionOutcome`]: observation produced by one action invocation

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant using the provided tools.";
pub const DEFAULT_INSTRUCTIONS_PROMPT: &str = "math_assistant_instructions";

/// Unique identifier for a routed conversation
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for the agent engine
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Maximum reasoning steps per conversation. `None` runs until the model
    /// answers or the session fails.
    pub max_iterations: Option<usize>,
    /// Maximum tokens per response
    pub max_tokens: u32,
    /// Sampling temperature forwarded to the reasoning capability
    pub temperature: Option<f32>,
    /// System prompt used when the provider supplies no instructions
    pub system_prompt: String,
    /// Name of the provider prompt fetched as instructions after connecting.
    /// `None` skips the lookup.
    pub instructions_prompt: Option<String>,
    /// Issue the invocations of one step concurrently.
    ///
    /// Observations are recorded in request order either way.
    pub parallel_actions: bool,
    /// Upper bound on a single request/response round trip with a provider
    pub request_timeout: Duration,
    /// Retry configuration for transient reasoning errors
    pub retry: RetryConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: Some(10),
            max_tokens: 4096,
            temperature: Some(0.0),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            instructions_prompt: Some(DEFAULT_INSTRUCTIONS_PROMPT.to_owned()),
            parallel_actions: false,
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

/// Configuration for retry behavior on transient errors.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 120_000,
        }
    }
}

impl RetryConfig {
    /// Create a retry config with no retries (for testing)
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Create a retry config with fast retries (for testing)
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }
}

/// Token usage statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub const fn add(&mut self, other: &Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Observation recorded for one action invocation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Whether the provider executed the action successfully
    pub success: bool,
    /// Text fed back to the model
    pub output: String,
    /// Error kind when the invocation failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Wall-clock duration of the invocation in milliseconds
    pub duration_ms: Option<u64>,
}

impl ActionOutcome {
    #[must_use]
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error_kind: None,
            duration_ms: None,
        }
    }

    #[must_use]
    pub fn failure(err: &crate::AgentError) -> Self {
        Self {
            success: false,
            output: err.to_string(),
            error_kind: Some(err.kind().to_owned()),
            duration_ms: None,
        }
    }

    #[must_use]
    pub const fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}
