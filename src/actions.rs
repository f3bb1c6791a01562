//! Action adapter: turns a provider's declared tools into validated,
//! session-bound callables.
//!
//! ```ignore
//! let session = manager.connect(&provider).await?;
//! let handles = ActionAdapter::adapt_all(&session);
//! let tools: Vec<_> = handles.iter().map(ActionHandle::to_llm_tool).collect();
//! let output = handles[0].invoke(json!({"a": 10, "b": 20})).await?;
//! ```

pub mod schema;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub use schema::{ArgumentSchema, FieldSpec, FieldType};

use crate::error::{AgentError, Result};
use crate::llm::Tool;
use crate::mcp::McpToolDefinition;
use crate::session::Session;

/// An action as declared by a provider during the handshake.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Raw JSON-Schema object, kept verbatim.
    pub argument_schema: Value,
}

impl From<McpToolDefinition> for ActionDeclaration {
    fn from(definition: McpToolDefinition) -> Self {
        Self {
            name: definition.name,
            description: definition.description,
            argument_schema: definition.input_schema,
        }
    }
}

/// A callable bound to one session and one declared action.
#[derive(Clone)]
pub struct ActionHandle {
    declaration: ActionDeclaration,
    schema: ArgumentSchema,
    session: Arc<Session>,
}

impl std::fmt::Debug for ActionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionHandle")
            .field("name", &self.declaration.name)
            .field("provider", &self.session.provider_id())
            .finish_non_exhaustive()
    }
}

impl ActionHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.declaration.name
    }

    #[must_use]
    pub const fn declaration(&self) -> &ActionDeclaration {
        &self.declaration
    }

    #[must_use]
    pub const fn schema(&self) -> &ArgumentSchema {
        &self.schema
    }

    #[must_use]
    pub const fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Catalog entry offered to the reasoning capability.
    #[must_use]
    pub fn to_llm_tool(&self) -> Tool {
        Tool {
            name: self.declaration.name.clone(),
            description: self.declaration.description.clone().unwrap_or_default(),
            input_schema: self.declaration.argument_schema.clone(),
        }
    }

    /// Validate `arguments` and invoke the action over the bound session.
    ///
    /// # Errors
    ///
    /// [`AgentError::ArgumentValidation`] before anything reaches the wire;
    /// otherwise whatever the session reports.
    pub async fn invoke(&self, arguments: &Value) -> Result<String> {
        let validated = self
            .schema
            .validate(arguments)
            .map_err(|reason| AgentError::ArgumentValidation {
                action: self.declaration.name.clone(),
                reason,
            })?;

        self.session
            .invoke(&self.declaration.name, Value::Object(validated))
            .await
    }
}

/// Pure mapping from declarations to handles.
pub struct ActionAdapter;

impl ActionAdapter {
    #[must_use]
    pub fn adapt(session: &Arc<Session>, declaration: ActionDeclaration) -> ActionHandle {
        let schema = ArgumentSchema::from_json_schema(&declaration.argument_schema);
        ActionHandle {
            declaration,
            schema,
            session: Arc::clone(session),
        }
    }

    /// Adapt every action the session declared, in declaration order.
    #[must_use]
    pub fn adapt_all(session: &Arc<Session>) -> Vec<ActionHandle> {
        session
            .actions()
            .iter()
            .cloned()
            .map(|declaration| Self::adapt(session, declaration))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionManager;
    use crate::test_utils::{FakeConnector, math_provider};
    use serde_json::json;

    async fn math_session(connector: &Arc<FakeConnector>) -> anyhow::Result<Arc<Session>> {
        let manager = SessionManager::new(connector.clone());
        Ok(manager.connect(&math_provider()).await?)
    }

    #[tokio::test]
    async fn test_adapt_round_trips_declaration() -> anyhow::Result<()> {
        let connector = FakeConnector::math();
        let session = math_session(&connector).await?;

        for declaration in session.actions() {
            let handle = ActionAdapter::adapt(&session, declaration.clone());
            assert_eq!(handle.declaration(), declaration);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_to_llm_tool_keeps_raw_schema() -> anyhow::Result<()> {
        let connector = FakeConnector::math();
        let session = math_session(&connector).await?;

        let handles = ActionAdapter::adapt_all(&session);
        let add = handles
            .iter()
            .find(|h| h.name() == "add")
            .map(ActionHandle::to_llm_tool);
        let add = add.ok_or_else(|| anyhow::anyhow!("add not adapted"))?;

        assert_eq!(add.description, "Add two numbers");
        assert_eq!(add.input_schema["required"], json!(["a", "b"]));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_transport() -> anyhow::Result<()> {
        let connector = FakeConnector::math();
        let session = math_session(&connector).await?;
        let handles = ActionAdapter::adapt_all(&session);
        let add = &handles[0];

        let err = add.invoke(&json!({"a": 10})).await.unwrap_err();

        assert!(matches!(err, AgentError::ArgumentValidation { ref action, .. } if action == "add"));
        assert_eq!(connector.transport().call_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_invoke_coerces_then_calls() -> anyhow::Result<()> {
        let connector = FakeConnector::math();
        let session = math_session(&connector).await?;
        let handles = ActionAdapter::adapt_all(&session);

        let output = handles[0].invoke(&json!({"a": "10", "b": 20})).await?;

        assert_eq!(output, "30");
        assert_eq!(connector.transport().call_count(), 1);
        Ok(())
    }

    #[test]
    fn test_declaration_without_description() {
        let declaration: ActionDeclaration = McpToolDefinition {
            name: "ping".into(),
            description: None,
            input_schema: json!({}),
        }
        .into();

        assert_eq!(declaration.name, "ping");
        assert!(declaration.description.is_none());
        assert_eq!(declaration.argument_schema, json!({}));
    }
}
