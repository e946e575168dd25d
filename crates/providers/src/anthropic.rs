//! Anthropic Messages API provider.
//!
//! - `x-api-key` header authentication and `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Consecutive tool results folded into a single user turn

use async_trait::async_trait;
use incident_config::AnthropicConfig;
use incident_core::error::ProviderError;
use incident_core::message::{Message, MessageToolCall, Role};
use incident_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::build(api_key.into(), DEFAULT_API_URL.into(), Duration::from_secs(120))
    }

    /// Build from the `[anthropic]` config section.
    pub fn from_config(config: &AnthropicConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::NotConfigured("ANTHROPIC_API_KEY is not set".into()))?;
        Self::build(
            api_key,
            config.api_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn build(api_key: String, api_url: String, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;
        Ok(Self {
            name: "anthropic".into(),
            api_url,
            api_key,
            client,
        })
    }

    /// Point at a different endpoint (proxies, test servers).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Anthropic puts the system prompt in a top-level field, not in messages.
    fn extract_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut non_system: Vec<&Message> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_parts.push(&msg.content),
                _ => non_system.push(msg),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, non_system)
    }

    /// Convert messages to the API's content-block format.
    ///
    /// All tool results answering one assistant turn must travel in a single
    /// user message, so consecutive `Role::Tool` messages are merged.
    fn to_api_messages(messages: &[&Message]) -> Vec<AnthropicMessage> {
        let mut result: Vec<AnthropicMessage> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::User => result.push(AnthropicMessage {
                    role: "user".into(),
                    content: AnthropicContent::Text(msg.content.clone()),
                }),
                Role::Assistant if msg.tool_calls.is_empty() => result.push(AnthropicMessage {
                    role: "assistant".into(),
                    content: AnthropicContent::Text(msg.content.clone()),
                }),
                Role::Assistant => {
                    let mut blocks: Vec<ContentBlock> = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(ContentBlock::Text {
                            text: msg.content.clone(),
                        });
                    }
                    for tc in &msg.tool_calls {
                        // The API requires an object; malformed input was already
                        // answered with a failed tool result.
                        let input = serde_json::from_str::<serde_json::Value>(&tc.arguments)
                            .ok()
                            .filter(|v| v.is_object())
                            .unwrap_or_else(|| serde_json::json!({}));
                        blocks.push(ContentBlock::ToolUse {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            input,
                        });
                    }
                    result.push(AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
                Role::Tool => {
                    let block = ContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                        content: msg.content.clone(),
                        is_error: msg.is_error,
                    };
                    match result.last_mut() {
                        Some(AnthropicMessage {
                            role,
                            content: AnthropicContent::Blocks(blocks),
                        }) if role == "user" => blocks.push(block),
                        _ => result.push(AnthropicMessage {
                            role: "user".into(),
                            content: AnthropicContent::Blocks(vec![block]),
                        }),
                    }
                }
                Role::System => {} // handled separately
            }
        }

        result
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn response_to_provider_response(resp: AnthropicResponse) -> ProviderResponse {
        let mut text_content = String::new();
        let mut tool_calls = Vec::new();

        for block in &resp.content {
            match block {
                ResponseContentBlock::Text { text } => {
                    if !text_content.is_empty() {
                        text_content.push('\n');
                    }
                    text_content.push_str(text);
                }
                ResponseContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(MessageToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: input.to_string(),
                    });
                }
                ResponseContentBlock::Other => {}
            }
        }

        let mut message = Message::assistant_with_calls(text_content.trim(), tool_calls);
        message.id = resp.id;

        ProviderResponse {
            message,
            stop_reason: StopReason::parse(resp.stop_reason.as_deref()),
            usage: Some(Usage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
                total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
            }),
            model: resp.model,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let (system, messages) = Self::extract_system(&request.messages);
        let api_messages = Self::to_api_messages(&messages);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": api_messages,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
        });
        if let Some(ref sys) = system {
            body["system"] = serde_json::json!(sys);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(provider = "anthropic", model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid Anthropic API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: AnthropicResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse Anthropic response: {e}"),
            })?;

        Ok(Self::response_to_provider_response(api_resp))
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str, name: &str, args: &str) -> MessageToolCall {
        MessageToolCall {
            id: id.into(),
            name: name.into(),
            arguments: args.into(),
        }
    }

    #[test]
    fn constructor() {
        let provider = AnthropicProvider::new("sk-ant-test").unwrap();
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn from_config_requires_key() {
        let config = AnthropicConfig::default();
        assert!(matches!(
            AnthropicProvider::from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));

        let config = AnthropicConfig {
            api_key: Some("sk-ant-test".into()),
            ..AnthropicConfig::default()
        };
        let provider = AnthropicProvider::from_config(&config)
            .unwrap()
            .with_api_url("http://127.0.0.1:9/v1/messages/");
        assert_eq!(provider.api_url, "http://127.0.0.1:9/v1/messages");
    }

    #[test]
    fn system_extraction() {
        let messages = vec![
            Message::system("You are TriageAgent"),
            Message::user("Incident INC0010001"),
            Message::assistant("Done"),
        ];
        let (system, non_system) = AnthropicProvider::extract_system(&messages);
        assert_eq!(system.as_deref(), Some("You are TriageAgent"));
        assert_eq!(non_system.len(), 2);
        assert_eq!(non_system[0].role, Role::User);
    }

    #[test]
    fn assistant_tool_calls_become_blocks() {
        let msg = Message::assistant_with_calls(
            "Checking CI",
            vec![call("toolu_1", "add_work_note", r#"{"note":"CI empty"}"#)],
        );
        let api_msgs = AnthropicProvider::to_api_messages(&[&msg]);
        assert_eq!(api_msgs.len(), 1);
        match &api_msgs[0].content {
            AnthropicContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2);
                match &blocks[1] {
                    ContentBlock::ToolUse { id, input, .. } => {
                        assert_eq!(id, "toolu_1");
                        assert_eq!(input["note"], "CI empty");
                    }
                    _ => panic!("Expected tool_use block"),
                }
            }
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn malformed_tool_input_sent_as_empty_object() {
        let msg = Message::assistant_with_calls("", vec![call("toolu_1", "set_pending", "{oops")]);
        let api_msgs = AnthropicProvider::to_api_messages(&[&msg]);
        match &api_msgs[0].content {
            AnthropicContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 1);
                match &blocks[0] {
                    ContentBlock::ToolUse { input, .. } => assert!(input.is_object()),
                    _ => panic!("Expected tool_use block"),
                }
            }
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn consecutive_tool_results_merge_into_one_user_turn() {
        let assistant = Message::assistant_with_calls(
            "",
            vec![
                call("toolu_1", "cancel_order", r#"{"order_id":"ORD-1"}"#),
                call("toolu_2", "add_work_note", r#"{"note":"x"}"#),
            ],
        );
        let r1 = Message::tool_result("toolu_1", "{\"error\":\"503\"}", true);
        let r2 = Message::tool_result("toolu_2", "{\"ok\":true}", false);
        let api_msgs = AnthropicProvider::to_api_messages(&[&assistant, &r1, &r2]);

        assert_eq!(api_msgs.len(), 2);
        assert_eq!(api_msgs[1].role, "user");
        let json = serde_json::to_value(&api_msgs[1]).unwrap();
        let blocks = json["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["type"], "tool_result");
        assert_eq!(blocks[0]["is_error"], true);
        assert_eq!(blocks[1]["tool_use_id"], "toolu_2");
    }

    #[test]
    fn response_conversion_collects_tool_calls() {
        let raw = serde_json::json!({
            "id": "msg_01",
            "model": "claude-3-5-haiku-20241022",
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 120, "output_tokens": 30 },
            "content": [
                { "type": "text", "text": "Cancelling the order." },
                { "type": "tool_use", "id": "toolu_9", "name": "cancel_order",
                  "input": { "order_id": "ORD-12345" } },
                { "type": "thinking", "thinking": "hidden" }
            ]
        });
        let resp: AnthropicResponse = serde_json::from_value(raw).unwrap();
        let converted = AnthropicProvider::response_to_provider_response(resp);
        assert_eq!(converted.stop_reason, StopReason::ToolUse);
        assert!(converted.requests_tools());
        assert_eq!(converted.message.tool_calls[0].name, "cancel_order");
        assert!(converted.message.tool_calls[0].arguments.contains("ORD-12345"));
        assert_eq!(converted.message.content, "Cancelling the order.");
        assert_eq!(converted.usage.unwrap().total_tokens, 150);
    }

    #[test]
    fn tool_definitions_use_input_schema() {
        let defs = vec![ToolDefinition {
            name: "resolve_incident".into(),
            description: "Resolve".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let json = serde_json::to_value(AnthropicProvider::to_api_tools(&defs)).unwrap();
        assert_eq!(json[0]["input_schema"]["type"], "object");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_error() {
        let provider = AnthropicProvider::new("sk-ant-test")
            .unwrap()
            .with_api_url("http://127.0.0.1:9/v1/messages");
        let request = ProviderRequest {
            model: "claude-3-5-haiku-20241022".into(),
            messages: vec![Message::system("You triage."), Message::user("INC0010001")],
            temperature: 0.0,
            max_tokens: Some(64),
            tools: vec![],
        };

        let err = provider.complete(request).await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)), "got {err:?}");
    }
}
