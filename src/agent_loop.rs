//! The agent engine: a reasoning/acting loop over one conversation.
//!
//! Each conversation moves through an explicit state machine:
//!
//! ```text
//! Reasoning ──(text only)──────────────▶ Done
//!     │  ▲
//!     │  └──(observations appended)──┐
//!     ▼                              │
//! AwaitingAction ──(all executed)────┘
//! ```
//!
//! Recoverable action failures become observations the model can react to.
//! Fatal failures close the session and end the conversation.

mod action_execution;
mod helpers;
mod llm;


pub use helpers::ActionRequest;
use llm::call_llm_with_retry;

use crate::actions::ActionHandle;
use crate::conversation::{ConversationState, Observation};
use crate::error::{AgentError, Result};
use crate::events::{AgentEvent, EventSink};
use crate::llm::{ChatRequest, LlmProvider, Tool};
use crate::session::Session;
use crate::types::{AgentConfig, TokenUsage};
use action_execution::execute_requests;
use helpers::{extract_requests, turn_usage};
use log::{debug, error, info};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where a conversation currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineState {
    /// Waiting on the reasoning capability for the next step.
    Reasoning,
    /// The model asked for these invocations, in this order.
    AwaitingAction(Vec<ActionRequest>),
    /// The model produced its final answer.
    Done(String),
}

/// Result of a completed conversation.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub answer: String,
    /// Reasoning steps taken, including the final one.
    pub iterations: usize,
    pub usage: TokenUsage,
    pub duration: Duration,
}

pub struct AgentEngine<P: ?Sized> {
    provider: Arc<P>,
    config: AgentConfig,
    events: EventSink,
}

impl<P> AgentEngine<P>
where
    P: LlmProvider + ?Sized,
{
    #[must_use]
    pub fn new(provider: Arc<P>, config: AgentConfig) -> Self {
        Self {
            provider,
            config,
            events: EventSink::default(),
        }
    }

    /// Publish engine events to `events`.
    #[must_use]
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Drive the conversation until the model answers or a fatal error occurs.
    ///
    /// The conversation must already hold the user's query and an attached
    /// session. On every fatal path the session is closed before returning.
    ///
    /// # Errors
    ///
    /// - [`AgentError::Reasoning`] if the reasoning capability fails
    /// - [`AgentError::Transport`] if the connection is lost during an action
    ///   or between turns
    /// - [`AgentError::IterationLimit`] if the configured cap is reached
    /// - [`AgentError::Aborted`] if the session was closed by its owner
    ///   between turns
    pub async fn run(
        &self,
        conversation: &mut ConversationState,
        handles: &[ActionHandle],
        system_prompt: &str,
    ) -> Result<AgentOutcome> {
        let Some(session) = conversation.session().cloned() else {
            let err = AgentError::Aborted("no session attached to conversation".to_owned());
            self.events.emit(AgentEvent::error(&err)).await;
            return Err(err);
        };

        let start = Instant::now();
        let tools: Vec<Tool> = handles.iter().map(ActionHandle::to_llm_tool).collect();
        let mut total_usage = TokenUsage::default();
        let mut iterations = 0usize;
        let mut state = EngineState::Reasoning;

        info!(
            "conversation started id={} provider={} actions={}",
            conversation.id(),
            session.provider_id(),
            tools.len()
        );
        self.events
            .emit(AgentEvent::start(
                conversation.id().clone(),
                session.provider_id(),
            ))
            .await;

        loop {
            state = match state {
                EngineState::Reasoning => {
                    self.ensure_alive(&session).await?;
                    iterations += 1;
                    debug!("reasoning step {iterations} id={}", conversation.id());

                    let request = self.build_request(system_prompt, conversation, &tools);
                    let response =
                        match call_llm_with_retry(&*self.provider, request, &self.config.retry)
                            .await
                        {
                            Ok(response) => response,
                            Err(e) => return Err(self.fail(&session, e).await),
                        };

                    let usage = turn_usage(&response);
                    total_usage.add(&usage);

                    let text = response.text();
                    if !text.is_empty() {
                        self.events.emit(AgentEvent::text(&text)).await;
                    }

                    let requests = extract_requests(&response);
                    conversation.push_assistant(response.content);
                    self.events
                        .emit(AgentEvent::TurnComplete {
                            iteration: iterations,
                            usage,
                        })
                        .await;

                    if requests.is_empty() {
                        EngineState::Done(text)
                    } else if let Some(max) = self.config.max_iterations
                        && iterations >= max
                    {
                        return Err(self.fail(&session, AgentError::IterationLimit(max)).await);
                    } else {
                        EngineState::AwaitingAction(requests)
                    }
                }

                EngineState::AwaitingAction(requests) => {
                    self.ensure_alive(&session).await?;
                    let results = execute_requests(
                        handles,
                        &requests,
                        self.config.parallel_actions,
                        &self.events,
                    )
                    .await;

                    let mut observations = Vec::with_capacity(requests.len());
                    let mut fatal = None;
                    for (request, result) in requests.iter().zip(results) {
                        match result {
                            Ok(output) => observations.push(Observation {
                                request_id: request.id.clone(),
                                content: output,
                                is_error: false,
                            }),
                            Err(e) if e.is_recoverable() => observations.push(Observation {
                                request_id: request.id.clone(),
                                content: e.to_string(),
                                is_error: true,
                            }),
                            Err(e) => {
                                fatal = Some(e);
                                break;
                            }
                        }
                    }
                    conversation.push_observations(observations);

                    if let Some(e) = fatal {
                        return Err(self.fail(&session, e).await);
                    }
                    EngineState::Reasoning
                }

                EngineState::Done(answer) => {
                    let duration = start.elapsed();
                    info!(
                        "conversation complete id={} iterations={iterations} input_tokens={} output_tokens={}",
                        conversation.id(),
                        total_usage.input_tokens,
                        total_usage.output_tokens
                    );
                    self.events
                        .emit(AgentEvent::done(
                            conversation.id().clone(),
                            iterations,
                            total_usage.clone(),
                            duration,
                        ))
                        .await;
                    return Ok(AgentOutcome {
                        answer,
                        iterations,
                        usage: total_usage,
                        duration,
                    });
                }
            };
        }
    }

    fn build_request(
        &self,
        system_prompt: &str,
        conversation: &ConversationState,
        tools: &[Tool],
    ) -> ChatRequest {
        let has_tools = !tools.is_empty();
        ChatRequest {
            system: system_prompt.to_owned(),
            messages: conversation.messages().to_vec(),
            tools: has_tools.then(|| tools.to_vec()),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            parallel_tool_calls: has_tools.then_some(self.config.parallel_actions),
        }
    }

    async fn ensure_alive(&self, session: &Arc<Session>) -> Result<()> {
        if session.is_alive() {
            return Ok(());
        }
        let err = if session.transport_lost() {
            AgentError::Transport {
                provider: session.provider_id().to_owned(),
                reason: "connection lost".to_owned(),
            }
        } else {
            AgentError::Aborted(format!(
                "session for '{}' is closed",
                session.provider_id()
            ))
        };
        Err(self.fail(session, err).await)
    }

    /// Terminal path for every fatal error.
    async fn fail(&self, session: &Session, err: AgentError) -> AgentError {
        error!(
            "conversation failed provider={} kind={}: {err}",
            session.provider_id(),
            err.kind()
        );
        session.close().await;
        self.events.emit(AgentEvent::error(&err)).await;
        err
    }
}
