//! Just-in-time sessions with capability providers.
//!
//! A [`SessionManager`] belongs to one conversation. It opens at most one
//! [`Session`] per provider, performs the handshake once, and releases every
//! transport it opened on [`SessionManager::close_all`].

use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

use crate::actions::ActionDeclaration;
use crate::error::{AgentError, Result};
use crate::mcp::{Connector, McpClient, McpError, McpTransport, SseConnector, content_to_text};
use crate::registry::ProviderDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Ready,
    Closed,
}

impl SessionState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Ready => 1,
            Self::Closed => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Ready,
            _ => Self::Closed,
        }
    }
}

/// A live connection to one provider plus the actions it declared.
pub struct Session {
    provider_id: String,
    endpoint: Url,
    client: McpClient,
    actions: Vec<ActionDeclaration>,
    state: AtomicU8,
}

impl Session {
    fn new(provider: &ProviderDescriptor, transport: Arc<dyn McpTransport>) -> Self {
        Self {
            provider_id: provider.id.clone(),
            endpoint: provider.endpoint.clone(),
            client: McpClient::new(transport, provider.id.clone()),
            actions: Vec::new(),
            state: AtomicU8::new(SessionState::Connecting.as_u8()),
        }
    }

    /// Initialize, acknowledge and fetch the action list. Runs once, before
    /// the session is shared.
    async fn handshake(&mut self) -> Result<()> {
        let provider = self.provider_id.clone();
        self.client
            .initialize()
            .await
            .map_err(|e| setup_error(&provider, e))?;

        let tools = self
            .client
            .list_tools()
            .await
            .map_err(|e| setup_error(&provider, e))?;

        let actions: Vec<ActionDeclaration> =
            tools.into_iter().map(ActionDeclaration::from).collect();
        for (i, action) in actions.iter().enumerate() {
            if actions[..i].iter().any(|a| a.name == action.name) {
                return Err(AgentError::Handshake {
                    provider,
                    reason: format!("duplicate action '{}'", action.name),
                });
            }
        }

        self.actions = actions;
        self.set_state(SessionState::Ready);
        Ok(())
    }

    #[must_use]
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Actions declared during the handshake, in provider order.
    #[must_use]
    pub fn actions(&self) -> &[ActionDeclaration] {
        &self.actions
    }

    #[must_use]
    pub fn declares(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a.name == action)
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        let state = SessionState::from_u8(self.state.load(Ordering::SeqCst));
        if state == SessionState::Ready && self.client.transport().is_closed() {
            return SessionState::Closed;
        }
        state
    }

    /// The session was never closed by its owner, but the connection
    /// underneath it has gone away.
    #[must_use]
    pub fn transport_lost(&self) -> bool {
        SessionState::from_u8(self.state.load(Ordering::SeqCst)) == SessionState::Ready
            && self.client.transport().is_closed()
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state() == SessionState::Ready
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Invoke a declared action and return its text output.
    ///
    /// # Errors
    ///
    /// - [`AgentError::ActionNotFound`] if the action was never declared
    /// - [`AgentError::Action`] if the provider reports a failure
    /// - [`AgentError::Transport`] if the session is closed or the
    ///   connection is lost
    pub async fn invoke(&self, action: &str, arguments: Value) -> Result<String> {
        if !self.is_alive() {
            return Err(self.transport_error("session is closed"));
        }
        if !self.declares(action) {
            return Err(AgentError::ActionNotFound(action.to_owned()));
        }

        debug!("invoking action provider={} action={action}", self.provider_id);

        match self.client.call_tool(action, arguments).await {
            Ok(result) if result.is_error => Err(AgentError::Action {
                action: action.to_owned(),
                payload: content_to_text(&result.content),
            }),
            Ok(result) => Ok(content_to_text(&result.content)),
            Err(McpError::Transport(e)) => Err(self.transport_error(e)),
            Err(McpError::Rpc { error, .. }) => Err(AgentError::Action {
                action: action.to_owned(),
                payload: error.message,
            }),
            Err(e @ McpError::Malformed { .. }) => Err(AgentError::Action {
                action: action.to_owned(),
                payload: e.to_string(),
            }),
        }
    }

    /// Fetch a named prompt and return its first text message.
    ///
    /// Providers without the prompt yield `None`.
    pub async fn instructions(&self, prompt: &str) -> Option<String> {
        match self.client.get_prompt(prompt).await {
            Ok(result) => result.first_text().map(str::to_owned),
            Err(e) => {
                debug!(
                    "no instructions from provider={} prompt={prompt}: {e}",
                    self.provider_id
                );
                None
            }
        }
    }

    /// Release the transport. Idempotent; failures are logged.
    pub async fn close(&self) {
        let previous = self.state.swap(SessionState::Closed.as_u8(), Ordering::SeqCst);
        if SessionState::from_u8(previous) == SessionState::Closed {
            return;
        }
        info!("closing session provider={} endpoint={}", self.provider_id, self.endpoint);
        if let Err(e) = self.client.close().await {
            warn!("error closing session provider={}: {e}", self.provider_id);
        }
    }

    fn transport_error(&self, reason: impl ToString) -> AgentError {
        AgentError::Transport {
            provider: self.provider_id.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Transport failures while setting up mean the provider is unreachable;
/// anything else means it answered with a broken handshake.
fn setup_error(provider: &str, err: McpError) -> AgentError {
    match err {
        McpError::Transport(e) => AgentError::Connection {
            provider: provider.to_owned(),
            reason: e.to_string(),
        },
        other => AgentError::Handshake {
            provider: provider.to_owned(),
            reason: other.to_string(),
        },
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("provider_id", &self.provider_id)
            .field("endpoint", &self.endpoint.as_str())
            .field("actions", &self.actions.len())
            .field("state", &self.state())
            .finish()
    }
}

/// Per-conversation session registry.
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    request_timeout: Duration,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(Arc::new(SseConnector::new()))
    }
}

impl SessionManager {
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            request_timeout: Duration::from_secs(30),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Connect to a provider, reusing the conversation's existing session.
    ///
    /// The map lock is held across the handshake, so concurrent callers for
    /// the same provider share one session.
    ///
    /// # Errors
    ///
    /// - [`AgentError::Connection`] if the transport cannot be opened, or a
    ///   previous session to this provider was already closed
    /// - [`AgentError::Handshake`] if the provider's handshake is malformed
    pub async fn connect(&self, provider: &ProviderDescriptor) -> Result<Arc<Session>> {
        let mut sessions = self.sessions.lock().await;

        if let Some(existing) = sessions.get(&provider.id) {
            if existing.is_alive() {
                debug!("reusing session provider={}", provider.id);
                return Ok(Arc::clone(existing));
            }
            return Err(AgentError::Connection {
                provider: provider.id.clone(),
                reason: "session already closed in this conversation".to_owned(),
            });
        }

        info!("connecting provider={} endpoint={}", provider.id, provider.endpoint);

        let transport = self
            .connector
            .connect(&provider.endpoint, self.request_timeout)
            .await
            .map_err(|e| AgentError::Connection {
                provider: provider.id.clone(),
                reason: e.to_string(),
            })?;

        let mut session = Session::new(provider, transport);
        if let Err(e) = session.handshake().await {
            warn!("handshake failed provider={}: {e}", provider.id);
            session.close().await;
            return Err(e);
        }

        info!(
            "session ready provider={} actions={}",
            provider.id,
            session.actions().len()
        );

        let session = Arc::new(session);
        sessions.insert(provider.id.clone(), Arc::clone(&session));
        Ok(session)
    }

    /// # Errors
    ///
    /// See [`Session::invoke`].
    pub async fn invoke(&self, session: &Session, action: &str, arguments: Value) -> Result<String> {
        session.invoke(action, arguments).await
    }

    pub async fn close(&self, session: &Session) {
        session.close().await;
    }

    /// Close every session this manager opened.
    pub async fn close_all(&self) {
        let sessions: Vec<_> = self.sessions.lock().await.values().cloned().collect();
        for session in sessions {
            session.close().await;
        }
    }

    pub async fn get(&self, provider_id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(provider_id).cloned()
    }
}
