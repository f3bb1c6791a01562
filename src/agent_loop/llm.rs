use super::helpers::calculate_backoff_delay;
use crate::error::AgentError;
use crate::llm::{ChatOutcome, ChatRequest, ChatResponse, LlmProvider};
use crate::types::RetryConfig;
use log::{error, warn};
use tokio::time::sleep;

/// Call the LLM with retry logic for rate limits and server errors.
///
/// Exhausted retries, invalid requests and provider errors all surface as
/// [`AgentError::Reasoning`].
pub(crate) async fn call_llm_with_retry<P>(
    provider: &P,
    request: ChatRequest,
    retry: &RetryConfig,
) -> Result<ChatResponse, AgentError>
where
    P: LlmProvider + ?Sized,
{
    let max_retries = retry.max_retries;
    let mut attempt = 0u32;

    loop {
        let outcome = match provider.chat(request.clone()).await {
            Ok(o) => o,
            Err(e) => {
                error!("LLM error from provider={}: {e:#}", provider.provider());
                return Err(AgentError::Reasoning(format!("LLM error: {e:#}")));
            }
        };

        match outcome {
            ChatOutcome::Success(response) => return Ok(response),
            ChatOutcome::RateLimited => {
                attempt += 1;
                if attempt > max_retries {
                    error!("Rate limited by LLM provider after {max_retries} retries");
                    return Err(AgentError::Reasoning(format!(
                        "rate limited after {max_retries} retries"
                    )));
                }
                let delay = calculate_backoff_delay(attempt, retry);
                warn!(
                    "Rate limited, retrying after backoff (attempt={}, delay_ms={})",
                    attempt,
                    delay.as_millis()
                );

                sleep(delay).await;
            }
            ChatOutcome::InvalidRequest(msg) => {
                error!("Invalid request to LLM: {msg}");
                return Err(AgentError::Reasoning(format!("invalid request: {msg}")));
            }
            ChatOutcome::ServerError(msg) => {
                attempt += 1;
                if attempt > max_retries {
                    error!("LLM server error after {max_retries} retries: {msg}");
                    return Err(AgentError::Reasoning(format!(
                        "server error after {max_retries} retries: {msg}"
                    )));
                }
                let delay = calculate_backoff_delay(attempt, retry);
                warn!(
                    "Server error, retrying after backoff (attempt={attempt}, delay_ms={}, error={msg})",
                    delay.as_millis()
                );

                sleep(delay).await;
            }
        }
    }
}
