//! MCP client: the handshake and the three requests a session needs.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use super::protocol::{
    GetPromptParams, GetPromptResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, McpToolCallResult, McpToolDefinition,
    ToolCallParams, ToolsListResult,
};
use super::transport::{McpTransport, TransportError};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Error)]
pub enum McpError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{method} rejected: {error}")]
    Rpc {
        method: &'static str,
        error: JsonRpcError,
    },
    #[error("malformed {method} result: {reason}")]
    Malformed {
        method: &'static str,
        reason: String,
    },
}

/// Client for one MCP server connection.
///
/// ```ignore
/// let transport = SseConnector::new().connect(&url, Duration::from_secs(30)).await?;
/// let mut client = McpClient::new(transport, "MathServer");
/// client.initialize().await?;
/// let tools = client.list_tools().await?;
/// let result = client.call_tool("add", json!({"a": 10, "b": 20})).await?;
/// ```
pub struct McpClient {
    transport: Arc<dyn McpTransport>,
    server_name: String,
    server_info: Option<InitializeResult>,
}

impl McpClient {
    #[must_use]
    pub fn new(transport: Arc<dyn McpTransport>, server_name: impl Into<String>) -> Self {
        Self {
            transport,
            server_name: server_name.into(),
            server_info: None,
        }
    }

    /// Run the `initialize` exchange and send `notifications/initialized`.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Malformed`] if the result lacks `protocolVersion`
    /// or `serverInfo`.
    pub async fn initialize(&mut self) -> Result<&InitializeResult, McpError> {
        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: Value::Object(serde_json::Map::new()),
            client_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
        };

        let result: InitializeResult = self.request("initialize", Some(to_params(&params)?)).await?;
        log::debug!(
            "initialized server={} remote={} protocol={}",
            self.server_name,
            result.server_info.name,
            result.protocol_version
        );

        self.transport
            .notify(JsonRpcNotification::new("notifications/initialized", None))
            .await?;

        Ok(self.server_info.insert(result))
    }

    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    #[must_use]
    pub const fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.as_ref()
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn McpTransport> {
        &self.transport
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or the result has no `tools`.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        let result: ToolsListResult = self.request("tools/list", None).await?;
        Ok(result.tools)
    }

    /// Call a tool. A result flagged `isError` is returned as-is; the caller
    /// decides how to surface it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects it.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolCallResult, McpError> {
        let params = ToolCallParams {
            name: name.to_string(),
            arguments,
        };
        self.request("tools/call", Some(to_params(&params)?)).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or the prompt is unknown.
    pub async fn get_prompt(&self, name: &str) -> Result<GetPromptResult, McpError> {
        let params = GetPromptParams {
            name: name.to_string(),
            arguments: None,
        };
        self.request("prompts/get", Some(to_params(&params)?)).await
    }

    /// # Errors
    ///
    /// Returns an error if the transport fails to close.
    pub async fn close(&self) -> Result<(), McpError> {
        self.transport.close().await.map_err(McpError::from)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Option<Value>,
    ) -> Result<T, McpError> {
        let response = self
            .transport
            .send(JsonRpcRequest::new(method, params, 0))
            .await?;

        let result = response
            .into_result()
            .map_err(|error| McpError::Rpc { method, error })?;

        serde_json::from_value(result).map_err(|e| McpError::Malformed {
            method,
            reason: e.to_string(),
        })
    }
}

fn to_params<T: serde::Serialize>(params: &T) -> Result<Value, McpError> {
    serde_json::to_value(params).map_err(|e| McpError::Transport(TransportError::Encode(e)))
}
