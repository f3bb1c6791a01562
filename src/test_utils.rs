use crate::events::AgentEventEnvelope;
use crate::llm::{ChatOutcome, ChatRequest, ChatResponse, ContentBlock, StopReason, Usage};
use crate::mcp::protocol::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId, error_codes,
};
use crate::mcp::{Connector, McpTransport, TransportError};
use crate::registry::ProviderDescriptor;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use url::Url;

// ===================
// Mock LLM Provider
// ===================

pub struct MockProvider {
    responses: RwLock<Vec<ChatOutcome>>,
    requests: Mutex<Vec<ChatRequest>>,
    call_count: AtomicUsize,
}

impl MockProvider {
    pub fn new(responses: Vec<ChatOutcome>) -> Self {
        Self {
            responses: RwLock::new(responses),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("lock poisoned").clone()
    }

    pub fn text_response(text: &str) -> ChatOutcome {
        Self::response(
            vec![ContentBlock::Text {
                text: text.to_string(),
            }],
            StopReason::EndTurn,
        )
    }

    pub fn tool_use_response(tool_id: &str, tool_name: &str, input: Value) -> ChatOutcome {
        Self::tool_uses_response(vec![(tool_id, tool_name, input)])
    }

    pub fn tool_uses_response(tool_uses: Vec<(&str, &str, Value)>) -> ChatOutcome {
        let content = tool_uses
            .into_iter()
            .map(|(id, name, input)| ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input,
            })
            .collect();
        Self::response(content, StopReason::ToolUse)
    }

    fn response(content: Vec<ContentBlock>, stop_reason: StopReason) -> ChatOutcome {
        ChatOutcome::Success(ChatResponse {
            id: "msg_1".to_string(),
            content,
            model: "mock-model".to_string(),
            stop_reason: Some(stop_reason),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 20,
            },
        })
    }
}

#[async_trait]
impl crate::llm::LlmProvider for MockProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome> {
        self.requests.lock().expect("lock poisoned").push(request);
        let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
        let responses = self.responses.read().expect("lock poisoned");
        Ok(responses
            .get(idx)
            .cloned()
            .unwrap_or_else(|| Self::text_response("Done")))
    }

    fn model(&self) -> &'static str {
        "mock-model"
    }

    fn provider(&self) -> &'static str {
        "mock"
    }
}

pub async fn drain_events(
    mut rx: tokio::sync::mpsc::Receiver<AgentEventEnvelope>,
) -> Vec<AgentEventEnvelope> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

// ===================
// In-memory MCP server
// ===================

pub const MATH_INSTRUCTIONS: &str = "You are a precise math assistant.";

pub fn math_provider() -> ProviderDescriptor {
    ProviderDescriptor {
        id: "MathServer".to_string(),
        endpoint: Url::parse("http://127.0.0.1:8000/sse").expect("valid url"),
        description: "Arithmetic: add, subtract, divide".to_string(),
    }
}

fn binary_tool(name: &str, description: &str) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": {
                "a": {"type": "number"},
                "b": {"type": "number"}
            },
            "required": ["a", "b"]
        }
    })
}

/// Answers MCP requests for a small math server and records traffic.
pub struct FakeTransport {
    initialize_result: Mutex<Value>,
    tools_result: Mutex<Value>,
    methods: Mutex<Vec<String>>,
    notifications: Mutex<Vec<String>>,
    call_count: AtomicUsize,
    close_count: AtomicUsize,
    fail_calls: AtomicBool,
    closed: AtomicBool,
    call_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    next_id: AtomicU64,
}

impl FakeTransport {
    pub fn math() -> Arc<Self> {
        Arc::new(Self {
            initialize_result: Mutex::new(json!({
                "protocolVersion": crate::mcp::MCP_PROTOCOL_VERSION,
                "capabilities": {"tools": {}, "prompts": {}},
                "serverInfo": {"name": "MathServer", "version": "1.0.0"}
            })),
            tools_result: Mutex::new(json!({
                "tools": [
                    binary_tool("add", "Add two numbers"),
                    binary_tool("subtract", "Subtract b from a"),
                    binary_tool("divide", "Divide a by b"),
                ]
            })),
            methods: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
            fail_calls: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            call_delay: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn with_initialize_result(self: Arc<Self>, result: Value) -> Arc<Self> {
        *self.initialize_result.lock().expect("lock poisoned") = result;
        self
    }

    pub fn with_tools_result(self: Arc<Self>, result: Value) -> Arc<Self> {
        *self.tools_result.lock().expect("lock poisoned") = result;
        self
    }

    pub fn with_call_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.call_delay.lock().expect("lock poisoned") = Some(delay);
        self
    }

    /// Make every following `tools/call` drop the connection.
    pub fn fail_calls(&self) {
        self.fail_calls.store(true, Ordering::SeqCst);
    }

    /// Number of `tools/call` requests that reached the server.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn method_count(&self, method: &str) -> usize {
        self.methods
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|m| *m == method)
            .count()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().expect("lock poisoned").clone()
    }

    async fn call_tool(&self, id: RequestId, params: &Value) -> Result<JsonRpcResponse, TransportError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_calls.load(Ordering::SeqCst) {
            self.closed.store(true, Ordering::SeqCst);
            return Err(TransportError::Closed);
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let delay = *self.call_delay.lock().expect("lock poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let name = params["name"].as_str().unwrap_or_default();
        let a = params["arguments"]["a"].as_f64().unwrap_or_default();
        let b = params["arguments"]["b"].as_f64().unwrap_or_default();
        let (text, is_error) = match name {
            "add" => ((a + b).to_string(), false),
            "subtract" => ((a - b).to_string(), false),
            "divide" if b == 0.0 => ("Cannot divide by zero".to_string(), true),
            "divide" => ((a / b).to_string(), false),
            other => {
                return Ok(JsonRpcResponse::failure(
                    id,
                    error_codes::INVALID_PARAMS,
                    format!("Unknown tool: {other}"),
                ));
            }
        };

        Ok(JsonRpcResponse::success(
            id,
            json!({"content": [{"type": "text", "text": text}], "isError": is_error}),
        ))
    }
}

#[async_trait]
impl McpTransport for FakeTransport {
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.methods
            .lock()
            .expect("lock poisoned")
            .push(request.method.clone());

        let params = request.params.unwrap_or(Value::Null);
        match request.method.as_str() {
            "initialize" => {
                let result = self.initialize_result.lock().expect("lock poisoned").clone();
                Ok(JsonRpcResponse::success(id, result))
            }
            "tools/list" => {
                let result = self.tools_result.lock().expect("lock poisoned").clone();
                Ok(JsonRpcResponse::success(id, result))
            }
            "tools/call" => self.call_tool(id, &params).await,
            "prompts/get" if params["name"] == "math_assistant_instructions" => {
                Ok(JsonRpcResponse::success(
                    id,
                    json!({
                        "messages": [{
                            "role": "user",
                            "content": {"type": "text", "text": MATH_INSTRUCTIONS}
                        }]
                    }),
                ))
            }
            "prompts/get" => Ok(JsonRpcResponse::failure(
                id,
                error_codes::INVALID_PARAMS,
                "Unknown prompt",
            )),
            _ => Ok(JsonRpcResponse::failure(
                id,
                error_codes::METHOD_NOT_FOUND,
                "Method not found",
            )),
        }
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.notifications
            .lock()
            .expect("lock poisoned")
            .push(notification.method);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.close_count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Hands out one shared [`FakeTransport`] and counts connection attempts.
pub struct FakeConnector {
    transport: Arc<FakeTransport>,
    reachable: bool,
    connect_count: AtomicUsize,
}

impl FakeConnector {
    pub fn math() -> Arc<Self> {
        Self::with_transport(FakeTransport::math())
    }

    pub fn with_transport(transport: Arc<FakeTransport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            reachable: true,
            connect_count: AtomicUsize::new(0),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            transport: FakeTransport::math(),
            reachable: false,
            connect_count: AtomicUsize::new(0),
        })
    }

    pub fn transport(&self) -> &Arc<FakeTransport> {
        &self.transport
    }

    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _endpoint: &Url,
        _request_timeout: Duration,
    ) -> Result<Arc<dyn McpTransport>, TransportError> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        if !self.reachable {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        let transport: Arc<dyn McpTransport> = self.transport.clone();
        Ok(transport)
    }
}
