//! Picks the one provider a query should be routed to.

use std::fmt::Write;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::llm::{ChatOutcome, ChatRequest, ChatResponse, LlmProvider};
use crate::registry::ProviderDescriptor;

/// Sentinel the model answers with when no provider fits.
const NO_MATCH: &str = "None";

pub struct Router<P: ?Sized> {
    provider: Arc<P>,
    max_tokens: u32,
}

impl<P> Router<P>
where
    P: LlmProvider + ?Sized,
{
    #[must_use]
    pub const fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            max_tokens: 50,
        }
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Ask the reasoning capability which provider serves `query`.
    ///
    /// The reply must name one of `providers` exactly (after trimming quotes
    /// and trailing punctuation). There is no fallback provider.
    ///
    /// # Errors
    ///
    /// [`AgentError::Routing`] if `providers` is empty, the reasoning call
    /// fails, or the reply matches no provider.
    pub async fn select(&self, query: &str, providers: &[ProviderDescriptor]) -> Result<String> {
        if providers.is_empty() {
            return Err(AgentError::Routing("no providers registered".to_owned()));
        }

        let request = ChatRequest::prompt(build_routing_prompt(providers), query, self.max_tokens);

        let response = match self.provider.chat(request).await {
            Ok(ChatOutcome::Success(response)) => response,
            Ok(ChatOutcome::RateLimited) => {
                log::warn!("Router rate limited by {}", self.provider.model());
                return Err(AgentError::Routing(
                    "reasoning capability rate limited".to_owned(),
                ));
            }
            Ok(ChatOutcome::InvalidRequest(e)) => {
                log::error!("Router invalid request: {e}");
                return Err(AgentError::Routing(format!("invalid request: {e}")));
            }
            Ok(ChatOutcome::ServerError(e)) => {
                log::error!("Router server error: {e}");
                return Err(AgentError::Routing(format!("server error: {e}")));
            }
            Err(e) => {
                log::error!("Router LLM error: {e:#}");
                return Err(AgentError::Routing(format!("LLM error: {e:#}")));
            }
        };

        let choice = parse_choice(&response);
        log::debug!("Router reply {choice:?} using {}", self.provider.model());

        if choice == NO_MATCH {
            return Err(AgentError::Routing(format!(
                "no provider matches query: {query}"
            )));
        }

        providers
            .iter()
            .find(|p| p.id == choice)
            .map(|p| {
                log::info!("Router selected provider={}", p.id);
                p.id.clone()
            })
            .ok_or_else(|| AgentError::Routing(format!("unknown provider selected: {choice}")))
    }
}

fn build_routing_prompt(providers: &[ProviderDescriptor]) -> String {
    let mut prompt = String::from(
        "You are an MCP Router. Below is a list of available servers and their capabilities:\n",
    );
    for provider in providers {
        let _ = writeln!(prompt, "- {}: {}", provider.id, provider.description);
    }
    let _ = write!(
        prompt,
        "\nGiven the user's query, return ONLY the name of the most relevant server. \
         If none match, return '{NO_MATCH}'."
    );
    prompt
}

fn parse_choice(response: &ChatResponse) -> String {
    let text = response.first_text().unwrap_or("").trim();
    let text = text.strip_suffix('.').unwrap_or(text);
    text.trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c.is_whitespace())
        .to_owned()
}
