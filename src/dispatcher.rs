//! End-to-end handling of one query.
//!
//! The dispatcher routes the query, connects to the chosen provider just in
//! time, adapts its actions and runs the engine. Every session it opens is
//! released before [`Dispatcher::handle`] returns, on success and on error.

use std::sync::Arc;

use log::{debug, info};

use crate::actions::ActionAdapter;
use crate::agent_loop::{AgentEngine, AgentOutcome};
use crate::conversation::ConversationState;
use crate::error::{AgentError, Result};
use crate::events::EventSink;
use crate::llm::LlmProvider;
use crate::mcp::{Connector, SseConnector};
use crate::registry::{CapabilityRegistry, ProviderDescriptor};
use crate::router::Router;
use crate::session::SessionManager;
use crate::types::{AgentConfig, ConversationId};

/// Answer to one query, with the provider that produced it.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub conversation_id: ConversationId,
    pub provider_id: String,
    pub outcome: AgentOutcome,
}

impl DispatchOutcome {
    #[must_use]
    pub fn answer(&self) -> &str {
        &self.outcome.answer
    }
}

pub struct Dispatcher<P: ?Sized> {
    registry: CapabilityRegistry,
    router: Router<P>,
    provider: Arc<P>,
    config: AgentConfig,
    connector: Arc<dyn Connector>,
    events: EventSink,
}

impl<P> Dispatcher<P>
where
    P: LlmProvider + ?Sized,
{
    /// A dispatcher using the same reasoning capability for routing and for
    /// the engine, connecting over HTTP+SSE.
    #[must_use]
    pub fn new(registry: CapabilityRegistry, provider: Arc<P>, config: AgentConfig) -> Self {
        Self {
            registry,
            router: Router::new(Arc::clone(&provider)),
            provider,
            config,
            connector: Arc::new(SseConnector::new()),
            events: EventSink::default(),
        }
    }

    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Route `query`, run a conversation against the selected provider and
    /// return its final answer.
    ///
    /// # Errors
    ///
    /// Setup failures ([`AgentError::Routing`], [`AgentError::Connection`],
    /// [`AgentError::Handshake`]) are returned verbatim, as are the engine's
    /// fatal errors.
    pub async fn handle(&self, query: &str) -> Result<DispatchOutcome> {
        let provider_id = self.router.select(query, self.registry.lookup_all()).await?;
        let descriptor = self.registry.get(&provider_id).ok_or_else(|| {
            AgentError::Routing(format!("unknown provider selected: {provider_id}"))
        })?;

        let sessions = SessionManager::new(Arc::clone(&self.connector))
            .with_request_timeout(self.config.request_timeout);
        let result = self.converse(&sessions, descriptor, query).await;
        sessions.close_all().await;
        result
    }

    async fn converse(
        &self,
        sessions: &SessionManager,
        descriptor: &ProviderDescriptor,
        query: &str,
    ) -> Result<DispatchOutcome> {
        let session = sessions.connect(descriptor).await?;

        let mut conversation = ConversationState::new();
        conversation.push_user(query);
        conversation.attach_session(Arc::clone(&session));

        let system_prompt = match &self.config.instructions_prompt {
            Some(name) => session.instructions(name).await,
            None => None,
        }
        .unwrap_or_else(|| {
            debug!("using default system prompt provider={}", descriptor.id);
            self.config.system_prompt.clone()
        });

        let handles = ActionAdapter::adapt_all(&session);
        info!(
            "dispatching conversation id={} provider={} actions={}",
            conversation.id(),
            descriptor.id,
            handles.len()
        );

        let engine = AgentEngine::new(Arc::clone(&self.provider), self.config.clone())
            .with_events(self.events.clone());
        let outcome = engine.run(&mut conversation, &handles, &system_prompt).await?;

        Ok(DispatchOutcome {
            conversation_id: conversation.id().clone(),
            provider_id: descriptor.id.clone(),
            outcome,
        })
    }
}
