//! Error taxonomy for routing, session and engine failures.
//!
//! Every failure the crate surfaces is an [`AgentError`]. Some kinds are
//! terminal for the conversation (configuration, routing, connection,
//! handshake, transport) while others are fed back to the model as an
//! observation so it can correct itself. [`AgentError::is_recoverable`]
//! draws that line.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The capability registry could not be built.
    #[error("configuration error: {0}")]
    Config(String),

    /// No provider could be selected for the query.
    #[error("routing failed: {0}")]
    Routing(String),

    /// The transport to a provider could not be opened.
    #[error("could not connect to provider '{provider}': {reason}")]
    Connection { provider: String, reason: String },

    /// The provider answered but its handshake was malformed.
    #[error("handshake with provider '{provider}' failed: {reason}")]
    Handshake { provider: String, reason: String },

    /// The model asked for an action the provider never declared.
    #[error("action not found: {0}")]
    ActionNotFound(String),

    /// Arguments did not satisfy the action's declared schema.
    #[error("invalid arguments for '{action}': {reason}")]
    ArgumentValidation { action: String, reason: String },

    /// The provider executed the action and reported a failure.
    #[error("action '{action}' failed: {payload}")]
    Action { action: String, payload: String },

    /// The live session was lost mid-conversation.
    #[error("transport failure on provider '{provider}': {reason}")]
    Transport { provider: String, reason: String },

    /// The reasoning capability failed after retries or rejected the request.
    #[error("reasoning failed: {0}")]
    Reasoning(String),

    /// The engine ran more reasoning steps than configured.
    #[error("iteration limit of {0} reached without a final answer")]
    IterationLimit(usize),

    /// The session was closed between turns.
    #[error("conversation aborted: {0}")]
    Aborted(String),
}

impl AgentError {
    /// Whether this failure becomes an observation instead of ending the
    /// conversation.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ActionNotFound(_) | Self::ArgumentValidation { .. } | Self::Action { .. }
        )
    }

    /// Short, stable name of the error kind, used in logs and events.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Routing(_) => "routing",
            Self::Connection { .. } => "connection",
            Self::Handshake { .. } => "handshake",
            Self::ActionNotFound(_) => "action_not_found",
            Self::ArgumentValidation { .. } => "argument_validation",
            Self::Action { .. } => "action",
            Self::Transport { .. } => "transport",
            Self::Reasoning(_) => "reasoning",
            Self::IterationLimit(_) => "iteration_limit",
            Self::Aborted(_) => "aborted",
        }
    }
}

pub type Result<T, E = AgentError> = std::result::Result<T, E>;
