//! Model Context Protocol client support.
//!
//! - [`McpClient`] runs the handshake and the `tools/list`, `tools/call`
//!   and `prompts/get` requests
//! - [`McpTransport`] abstracts the wire; [`SseTransport`] implements the
//!   HTTP+SSE transport
//! - [`Connector`] opens transports, so sessions can be tested against an
//!   in-memory server
//!
//! Protocol version 2024-11-05 over JSON-RPC 2.0.

pub mod client;
pub mod protocol;
pub mod transport;

pub use client::{MCP_PROTOCOL_VERSION, McpClient, McpError};
pub use protocol::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpContent,
    McpToolCallResult, McpToolDefinition, content_to_text,
};
pub use transport::{Connector, McpTransport, SseConnector, SseTransport, TransportError};
