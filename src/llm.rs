//! The reasoning capability.
//!
//! The engine and the router only see [`LlmProvider`]: given a system prompt,
//! a history and an optional action catalog, a provider returns either a
//! final message or a structured request to invoke actions.

pub mod types;

pub use types::*;

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome>;
    fn model(&self) -> &str;
    fn provider(&self) -> &'static str;
}
