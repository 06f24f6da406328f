//! Anthropic messages API.

use super::{HttpRequest, ProviderAdapter, ProviderKind, RequestParams, to_body};
use crate::model::{Message, Role, StreamEvent, ToolDescriptor, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const ANTHROPIC_VERSION: &str = "2023-06-01";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ApiContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl ApiContentBlock {
    fn tool_result(call_id: &str, content: &str, is_error: bool) -> Self {
        Self::ToolResult {
            tool_use_id: call_id.to_string(),
            content: content.to_string(),
            is_error,
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiStreamEvent {
    ContentBlockStart { content_block: ApiResponseBlock },
    ContentBlockDelta { delta: ApiDelta },
    MessageStop,
    Error { error: Value },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiResponseBlock {
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

// ─────────────────────────────────────────────────────────────────────────────
// Adapter
// ─────────────────────────────────────────────────────────────────────────────

/// Adapter for the Anthropic messages API.
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    base_url: String,
}

/// Accumulates the outgoing message list.
///
/// Anthropic wants every run of consecutive tool results in one user turn,
/// so results are buffered until something else is pushed.
#[derive(Default)]
struct Turns {
    messages: Vec<ApiMessage>,
    results: Vec<ApiContentBlock>,
}

impl Turns {
    fn push(&mut self, message: ApiMessage) {
        self.flush_results();
        self.messages.push(message);
    }

    fn push_result(&mut self, block: ApiContentBlock) {
        self.results.push(block);
    }

    fn flush_results(&mut self) {
        if self.results.is_empty() {
            return;
        }
        let blocks = std::mem::take(&mut self.results);
        self.messages.push(ApiMessage {
            role: "user",
            content: ApiContent::Blocks(blocks),
        });
    }

    fn finish(mut self) -> Vec<ApiMessage> {
        self.flush_results();
        self.messages
    }
}

impl AnthropicAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn assistant_to_api(msg: &Message) -> Option<ApiMessage> {
        if msg.tool_calls.is_empty() {
            if msg.content.is_empty() {
                return None;
            }
            return Some(ApiMessage {
                role: "assistant",
                content: ApiContent::Text(msg.content.clone()),
            });
        }

        let mut blocks = Vec::with_capacity(msg.tool_calls.len() + 1);
        if !msg.content.is_empty() {
            blocks.push(ApiContentBlock::Text {
                text: msg.content.clone(),
            });
        }
        blocks.extend(msg.tool_calls.iter().map(|call| ApiContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.arguments_value(),
        }));
        Some(ApiMessage {
            role: "assistant",
            content: ApiContent::Blocks(blocks),
        })
    }

    /// The top-level system field: the prompt plus any inline system messages.
    fn build_system(system_prompt: Option<&str>, messages: &[Message]) -> Option<String> {
        let parts: Vec<&str> = system_prompt
            .into_iter()
            .chain(
                messages
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .map(|m| m.content.as_str()),
            )
            .filter(|s| !s.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    fn build_messages(messages: &[Message], pending: &[ToolResult]) -> Vec<ApiMessage> {
        let mut turns = Turns::default();
        for msg in messages {
            match msg.role {
                Role::System => {}
                Role::User => turns.push(ApiMessage {
                    role: "user",
                    content: ApiContent::Text(msg.content.clone()),
                }),
                Role::Assistant => {
                    if let Some(api) = Self::assistant_to_api(msg) {
                        turns.push(api);
                    }
                }
                Role::Tool => turns.push_result(ApiContentBlock::tool_result(
                    msg.tool_call_id.as_deref().unwrap_or_default(),
                    &msg.content,
                    false,
                )),
            }
        }
        for result in pending {
            turns.push_result(ApiContentBlock::tool_result(
                &result.call_id,
                &result.content,
                result.is_error,
            ));
        }
        turns.finish()
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn build_request(&self, params: &RequestParams<'_>) -> HttpRequest {
        let api_request = ApiRequest {
            model: params.model,
            max_tokens: params.max_tokens,
            messages: Self::build_messages(params.messages, params.tool_results),
            stream: true,
            system: Self::build_system(params.system_prompt, params.messages),
            tools: params
                .tools
                .iter()
                .map(|t| self.format_tool_schema(t))
                .collect(),
        };

        HttpRequest {
            url: format!("{}/messages", self.base_url),
            headers: vec![
                ("x-api-key".to_string(), params.credential.to_string()),
                ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
                ("content-type".to_string(), "application/json".to_string()),
                ("accept".to_string(), "text/event-stream".to_string()),
            ],
            body: to_body(&api_request),
        }
    }

    fn format_tool_schema(&self, tool: &ToolDescriptor) -> Value {
        to_body(&ApiTool {
            name: &tool.name,
            description: &tool.description,
            input_schema: &tool.parameters,
        })
    }

    fn parse_stream_event(&self, data: &str) -> Result<Vec<StreamEvent>, serde_json::Error> {
        let event = match serde_json::from_str::<ApiStreamEvent>(data)? {
            ApiStreamEvent::ContentBlockStart {
                content_block: ApiResponseBlock::ToolUse { id, name },
            } => StreamEvent::ToolCallStart { id, name },
            ApiStreamEvent::ContentBlockDelta {
                delta: ApiDelta::TextDelta { text },
            } if !text.is_empty() => StreamEvent::TextDelta(text),
            ApiStreamEvent::ContentBlockDelta {
                delta: ApiDelta::InputJsonDelta { partial_json },
            } if !partial_json.is_empty() => StreamEvent::ToolCallArgsDelta(partial_json),
            ApiStreamEvent::MessageStop => StreamEvent::StreamEnd,
            ApiStreamEvent::Error { error } => {
                tracing::warn!(provider = "anthropic", %error, "error payload in stream");
                return Ok(Vec::new());
            }
            _ => return Ok(Vec::new()),
        };
        Ok(vec![event])
    }

    fn is_sentinel(&self, _data: &str) -> bool {
        false
    }
}
