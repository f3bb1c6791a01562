//! MCP Router Agent - route natural-language queries to MCP tool servers.
//!
//! This crate provides:
//! - A capability registry of MCP servers and an LLM-driven router over it
//! - Just-in-time sessions over the MCP HTTP+SSE transport
//! - Adaptation of declared MCP tools into validated, callable actions
//! - An agent engine that alternates reasoning and action until it answers
//!
//! # Example
//!
//! ```ignore
//! use mcp_router_agent::{
//!     AgentConfig, CapabilityRegistry, Dispatcher, providers::OpenAIProvider,
//! };
//! use std::sync::Arc;
//!
//! let registry = CapabilityRegistry::from_path("servers.json")?;
//! let provider = Arc::new(OpenAIProvider::gpt4o_mini(api_key));
//! let dispatcher = Dispatcher::new(registry, provider, AgentConfig::default());
//!
//! let result = dispatcher.handle("What is 10 + 20?").await?;
//! println!("[{}] {}", result.provider_id, result.answer());
//! ```

#![forbid(unsafe_code)]

pub mod actions;
mod agent_loop;
pub mod config;
mod conversation;
mod dispatcher;
mod error;
mod events;
pub mod llm;
pub mod mcp;
pub mod providers;
pub mod registry;
mod router;
pub mod session;
mod types;

#[cfg(test)]
mod test_utils;

pub use actions::{ActionAdapter, ActionDeclaration, ActionHandle};
pub use agent_loop::{ActionRequest, AgentEngine, AgentOutcome, EngineState};
pub use config::Settings;
pub use conversation::{ConversationState, Observation};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{AgentError, Result};
pub use events::{AgentEvent, AgentEventEnvelope, EventSink, SequenceCounter};
pub use llm::LlmProvider;
pub use registry::{CapabilityRegistry, ProviderDescriptor};
pub use router::Router;
pub use session::{Session, SessionManager, SessionState};
pub use types::{
    ActionOutcome, AgentConfig, ConversationId, DEFAULT_INSTRUCTIONS_PROMPT,
    DEFAULT_SYSTEM_PROMPT, RetryConfig, TokenUsage,
};
