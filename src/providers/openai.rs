//! `OpenAI` chat-completions provider.
//!
//! Used both for routing decisions and for the engine's reasoning steps.
//! `OpenAI`-compatible servers (Ollama, vLLM, Azure) are reached through
//! [`OpenAIProvider::with_base_url`].

use crate::llm::{
    ChatOutcome, ChatRequest, ChatResponse, Content, ContentBlock, LlmProvider, Role, StopReason,
    Usage,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub const MODEL_GPT4O: &str = "gpt-4o";
pub const MODEL_GPT4O_MINI: &str = "gpt-4o-mini";

#[derive(Clone)]
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAIProvider {
    #[must_use]
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL.to_owned())
    }

    /// Create a provider for an OpenAI-compatible server.
    #[must_use]
    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    #[must_use]
    pub fn gpt4o(api_key: String) -> Self {
        Self::new(api_key, MODEL_GPT4O.to_owned())
    }

    /// Small, fast model suited to routing and tool selection.
    #[must_use]
    pub fn gpt4o_mini(api_key: String) -> Self {
        Self::new(api_key, MODEL_GPT4O_MINI.to_owned())
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome> {
        let messages = build_api_messages(&request);
        let tools: Option<Vec<ApiTool>> = request
            .tools
            .map(|ts| ts.into_iter().map(convert_tool).collect());

        // The API rejects parallel_tool_calls when no tools are offered.
        let parallel_tool_calls = tools.as_ref().and(request.parallel_tool_calls);

        let api_request = ApiChatRequest {
            model: &self.model,
            messages: &messages,
            max_completion_tokens: Some(request.max_tokens),
            temperature: request.temperature,
            tools: tools.as_deref(),
            parallel_tool_calls,
        };

        debug!(
            "OpenAI request model={} messages={} tools={}",
            self.model,
            messages.len(),
            tools.as_ref().map_or(0, Vec::len)
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&api_request)
            .send()
            .await
            .context("chat completion request failed")?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .context("failed to read chat completion body")?;

        debug!("OpenAI response status={status} body_len={}", bytes.len());

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(ChatOutcome::RateLimited);
        }

        if status.is_server_error() {
            let body = String::from_utf8_lossy(&bytes);
            error!("OpenAI server error status={status} body={body}");
            return Ok(ChatOutcome::ServerError(body.into_owned()));
        }

        if status.is_client_error() {
            let body = String::from_utf8_lossy(&bytes);
            warn!("OpenAI client error status={status} body={body}");
            return Ok(ChatOutcome::InvalidRequest(body.into_owned()));
        }

        let api_response: ApiChatResponse =
            serde_json::from_slice(&bytes).context("failed to parse chat completion")?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .context("no choices in chat completion")?;

        let content = build_content_blocks(&choice.message);

        let stop_reason = choice.finish_reason.map(|r| match r {
            ApiFinishReason::Stop => StopReason::EndTurn,
            ApiFinishReason::ToolCalls => StopReason::ToolUse,
            ApiFinishReason::Length => StopReason::MaxTokens,
            ApiFinishReason::ContentFilter => StopReason::StopSequence,
        });

        let usage = api_response.usage.map_or_else(Usage::default, |u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok(ChatOutcome::Success(ChatResponse {
            id: api_response.id,
            content,
            model: api_response.model,
            stop_reason,
            usage,
        }))
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &'static str {
        "openai"
    }
}

const fn api_role(role: Role) -> ApiRole {
    match role {
        Role::User => ApiRole::User,
        Role::Assistant => ApiRole::Assistant,
    }
}

fn build_api_messages(request: &ChatRequest) -> Vec<ApiMessage> {
    let mut messages = Vec::new();

    if !request.system.is_empty() {
        messages.push(ApiMessage::plain(ApiRole::System, request.system.clone()));
    }

    for msg in &request.messages {
        match &msg.content {
            Content::Text(text) => {
                messages.push(ApiMessage::plain(api_role(msg.role), text.clone()));
            }
            Content::Blocks(blocks) => {
                let mut text_parts = Vec::new();
                let mut tool_calls = Vec::new();

                for block in blocks {
                    match block {
                        ContentBlock::Text { text } => text_parts.push(text.clone()),
                        ContentBlock::ToolUse { id, name, input } => {
                            tool_calls.push(ApiToolCall {
                                id: id.clone(),
                                r#type: "function".to_owned(),
                                function: ApiFunctionCall {
                                    name: name.clone(),
                                    arguments: input.to_string(),
                                },
                            });
                        }
                        // Each observation is its own `tool` message.
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            ..
                        } => {
                            messages.push(ApiMessage {
                                role: ApiRole::Tool,
                                content: Some(content.clone()),
                                tool_calls: None,
                                tool_call_id: Some(tool_use_id.clone()),
                            });
                        }
                    }
                }

                let role = api_role(msg.role);
                if !text_parts.is_empty() || (role == ApiRole::Assistant && !tool_calls.is_empty()) {
                    messages.push(ApiMessage {
                        role,
                        content: (!text_parts.is_empty()).then(|| text_parts.join("\n")),
                        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                        tool_call_id: None,
                    });
                }
            }
        }
    }

    messages
}

fn convert_tool(t: crate::llm::Tool) -> ApiTool {
    ApiTool {
        r#type: "function".to_owned(),
        function: ApiFunction {
            name: t.name,
            description: t.description,
            parameters: t.input_schema,
        },
    }
}

/// Zero-argument calls arrive as an empty string and map to `Null`.
/// Unparseable arguments are passed through as a string so that argument
/// validation reports them back to the model.
fn parse_arguments(arguments: &str) -> serde_json::Value {
    if arguments.trim().is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(arguments)
        .unwrap_or_else(|_| serde_json::Value::String(arguments.to_owned()))
}

fn build_content_blocks(message: &ApiResponseMessage) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();

    if let Some(content) = &message.content
        && !content.is_empty()
    {
        blocks.push(ContentBlock::Text {
            text: content.clone(),
        });
    }

    if let Some(tool_calls) = &message.tool_calls {
        for tc in tool_calls {
            let input = parse_arguments(&tc.function.arguments);
            blocks.push(ContentBlock::ToolUse {
                id: tc.id.clone(),
                name: tc.function.name.clone(),
                input,
            });
        }
    }

    blocks
}

// ============================================================================
// API Request Types
// ============================================================================

#[derive(Serialize)]
struct ApiChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ApiTool]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: ApiRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    const fn plain(role: ApiRole, content: String) -> Self {
        Self {
            role,
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum ApiRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Serialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunctionCall,
}

#[derive(Serialize)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct ApiTool {
    r#type: String,
    function: ApiFunction,
}

#[derive(Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Deserialize)]
struct ApiChatResponse {
    id: String,
    choices: Vec<ApiChoice>,
    model: String,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    finish_reason: Option<ApiFinishReason>,
}

#[derive(Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiResponseToolCall>>,
}

#[derive(Deserialize)]
struct ApiResponseToolCall {
    id: String,
    function: ApiResponseFunctionCall,
}

#[derive(Deserialize)]
struct ApiResponseFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum ApiFinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ArgumentSchema;
    use crate::llm::{Message, Tool};
    use serde_json::json;

    fn request_with(messages: Vec<Message>, tools: Option<Vec<Tool>>) -> ChatRequest {
        ChatRequest {
            system: "You are helpful.".to_string(),
            messages,
            tools,
            max_tokens: 1024,
            temperature: Some(0.0),
            parallel_tool_calls: Some(false),
        }
    }

    // ===================
    // Constructor Tests
    // ===================

    #[test]
    fn test_gpt4o_mini_factory() {
        let provider = OpenAIProvider::gpt4o_mini("test-api-key".to_string());

        assert_eq!(provider.model(), MODEL_GPT4O_MINI);
        assert_eq!(provider.provider(), "openai");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_with_base_url_strips_trailing_slash() {
        let provider = OpenAIProvider::with_base_url(
            "test-api-key".to_string(),
            "llama3".to_string(),
            "http://localhost:11434/v1/".to_string(),
        );

        assert_eq!(provider.model(), "llama3");
        assert_eq!(provider.base_url, "http://localhost:11434/v1");
    }

    // ===================
    // Request Serialization Tests
    // ===================

    #[test]
    fn test_request_serializes_sampling_controls() -> anyhow::Result<()> {
        let messages = vec![ApiMessage::plain(ApiRole::User, "hi".to_string())];
        let tools = vec![convert_tool(Tool {
            name: "add".to_string(),
            description: "Add two numbers".to_string(),
            input_schema: json!({"type": "object"}),
        })];
        let request = ApiChatRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            max_completion_tokens: Some(256),
            temperature: Some(0.0),
            tools: Some(&tools),
            parallel_tool_calls: Some(false),
        };

        let value = serde_json::to_value(&request)?;
        assert_eq!(value["temperature"], json!(0.0));
        assert_eq!(value["parallel_tool_calls"], json!(false));
        assert_eq!(value["tools"][0]["function"]["name"], json!("add"));
        Ok(())
    }

    #[test]
    fn test_request_omits_unset_options() -> anyhow::Result<()> {
        let messages = vec![ApiMessage::plain(ApiRole::User, "hi".to_string())];
        let request = ApiChatRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            max_completion_tokens: None,
            temperature: None,
            tools: None,
            parallel_tool_calls: None,
        };

        let json = serde_json::to_string(&request)?;
        assert!(!json.contains("temperature"));
        assert!(!json.contains("tools"));
        assert!(!json.contains("parallel_tool_calls"));
        Ok(())
    }

    #[test]
    fn test_tool_message_serialization() -> anyhow::Result<()> {
        let message = ApiMessage {
            role: ApiRole::Tool,
            content: Some("30".to_string()),
            tool_calls: None,
            tool_call_id: Some("call_123".to_string()),
        };

        let json = serde_json::to_string(&message)?;
        assert!(json.contains("\"role\":\"tool\""));
        assert!(json.contains("\"tool_call_id\":\"call_123\""));
        Ok(())
    }

    // ===================
    // Response Deserialization Tests
    // ===================

    #[test]
    fn test_response_with_tool_calls_deserialization() -> anyhow::Result<()> {
        let json = r#"{
            "id": "chatcmpl-456",
            "choices": [
                {
                    "message": {
                        "content": null,
                        "tool_calls": [
                            {
                                "id": "call_abc",
                                "type": "function",
                                "function": {
                                    "name": "add",
                                    "arguments": "{\"a\": 10, \"b\": 20}"
                                }
                            }
                        ]
                    },
                    "finish_reason": "tool_calls"
                }
            ],
            "model": "gpt-4o-mini",
            "usage": {
                "prompt_tokens": 150,
                "completion_tokens": 30
            }
        }"#;

        let response: ApiChatResponse = serde_json::from_str(json)?;
        let blocks = build_content_blocks(&response.choices[0].message);

        assert_eq!(blocks.len(), 1);
        assert!(matches!(
            &blocks[0],
            ContentBlock::ToolUse { id, name, input }
                if id == "call_abc" && name == "add" && input == &json!({"a": 10, "b": 20})
        ));
        Ok(())
    }

    #[test]
    fn test_response_without_usage_deserializes() -> anyhow::Result<()> {
        let json = r#"{
            "id": "chatcmpl-1",
            "choices": [{"message": {"content": "MathServer"}, "finish_reason": "stop"}],
            "model": "local"
        }"#;

        let response: ApiChatResponse = serde_json::from_str(json)?;
        assert!(response.usage.is_none());
        assert!(matches!(
            response.choices[0].finish_reason,
            Some(ApiFinishReason::Stop)
        ));
        Ok(())
    }

    #[test]
    fn test_malformed_arguments_kept_as_string() {
        let message = ApiResponseMessage {
            content: None,
            tool_calls: Some(vec![ApiResponseToolCall {
                id: "call_1".to_string(),
                function: ApiResponseFunctionCall {
                    name: "add".to_string(),
                    arguments: "{not json".to_string(),
                },
            }]),
        };

        let blocks = build_content_blocks(&message);
        assert!(matches!(
            &blocks[0],
            ContentBlock::ToolUse { input, .. } if input == &json!("{not json")
        ));
    }

    #[test]
    fn test_empty_arguments_become_null() {
        for arguments in ["", "  "] {
            let message = ApiResponseMessage {
                content: None,
                tool_calls: Some(vec![ApiResponseToolCall {
                    id: "call_1".to_string(),
                    function: ApiResponseFunctionCall {
                        name: "ping".to_string(),
                        arguments: arguments.to_string(),
                    },
                }]),
            };

            let blocks = build_content_blocks(&message);
            let ContentBlock::ToolUse { input, .. } = &blocks[0] else {
                panic!("expected a tool use block");
            };
            assert!(input.is_null());

            // A zero-argument action accepts what the call carries.
            let schema = ArgumentSchema::from_json_schema(&json!({"type": "object"}));
            assert!(schema.validate(input).is_ok_and(|args| args.is_empty()));
        }
    }

    // ===================
    // Message Conversion Tests
    // ===================

    #[test]
    fn test_build_api_messages_with_system() {
        let request = request_with(vec![Message::user("Hello")], None);

        let api_messages = build_api_messages(&request);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, ApiRole::System);
        assert_eq!(api_messages[1].role, ApiRole::User);
        assert_eq!(api_messages[1].content, Some("Hello".to_string()));
    }

    #[test]
    fn test_build_api_messages_splits_observations() {
        let request = request_with(
            vec![
                Message::user("What is 10 + 20?"),
                Message::assistant_blocks(vec![
                    ContentBlock::ToolUse {
                        id: "call_1".to_string(),
                        name: "add".to_string(),
                        input: json!({"a": 10, "b": 20}),
                    },
                    ContentBlock::ToolUse {
                        id: "call_2".to_string(),
                        name: "add".to_string(),
                        input: json!({"a": 1, "b": 2}),
                    },
                ]),
                Message {
                    role: Role::User,
                    content: Content::Blocks(vec![
                        ContentBlock::tool_result("call_1", "30", false),
                        ContentBlock::tool_result("call_2", "3", false),
                    ]),
                },
            ],
            None,
        );

        let api_messages = build_api_messages(&request);
        let roles: Vec<_> = api_messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                ApiRole::System,
                ApiRole::User,
                ApiRole::Assistant,
                ApiRole::Tool,
                ApiRole::Tool
            ]
        );
        assert!(api_messages[2].content.is_none());
        assert_eq!(api_messages[2].tool_calls.as_ref().map(Vec::len), Some(2));
        assert_eq!(api_messages[4].tool_call_id.as_deref(), Some("call_2"));
    }
}
