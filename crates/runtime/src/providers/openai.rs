//! OpenAI chat completions, and the OpenAI-compatible Gemini endpoint.

use super::{HttpRequest, ProviderAdapter, ProviderKind, RequestParams, to_body};
use crate::model::{Message, Role, StreamEvent, ToolDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::text("tool", content)
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ApiFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ApiChunk {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    delta: ApiDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ApiDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCallDelta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ApiFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Adapter
// ─────────────────────────────────────────────────────────────────────────────

/// Adapter for the OpenAI chat completions wire format.
///
/// Gemini's OpenAI-compatible endpoint speaks the same format; the only
/// difference is that reasoning is switched off for latency.
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    kind: ProviderKind,
    base_url: String,
    disable_reasoning: bool,
}

impl OpenAiAdapter {
    pub fn openai(base_url: impl Into<String>) -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            base_url: base_url.into(),
            disable_reasoning: false,
        }
    }

    pub fn gemini(base_url: impl Into<String>) -> Self {
        Self {
            kind: ProviderKind::Gemini,
            base_url: base_url.into(),
            disable_reasoning: true,
        }
    }

    fn message_to_api(msg: &Message) -> ApiMessage {
        match msg.role {
            Role::System => ApiMessage::text("system", msg.content.clone()),
            Role::User => ApiMessage::text("user", msg.content.clone()),
            Role::Tool => ApiMessage::tool(
                msg.tool_call_id.clone().unwrap_or_default(),
                msg.content.clone(),
            ),
            Role::Assistant if msg.tool_calls.is_empty() => {
                ApiMessage::text("assistant", msg.content.clone())
            }
            Role::Assistant => ApiMessage {
                role: "assistant",
                content: (!msg.content.is_empty()).then(|| msg.content.clone()),
                tool_calls: msg
                    .tool_calls
                    .iter()
                    .map(|call| ApiToolCall {
                        id: call.id.clone(),
                        call_type: "function",
                        function: ApiFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments_json(),
                        },
                    })
                    .collect(),
                tool_call_id: None,
            },
        }
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn build_request(&self, params: &RequestParams<'_>) -> HttpRequest {
        let mut messages = Vec::with_capacity(params.messages.len() + params.tool_results.len() + 1);
        if let Some(system) = params.system_prompt.filter(|s| !s.is_empty()) {
            messages.push(ApiMessage::text("system", system));
        }
        messages.extend(params.messages.iter().map(Self::message_to_api));
        messages.extend(
            params
                .tool_results
                .iter()
                .map(|r| ApiMessage::tool(r.call_id.clone(), r.content.clone())),
        );

        let api_request = ApiRequest {
            model: params.model,
            messages,
            stream: true,
            tools: params
                .tools
                .iter()
                .map(|t| self.format_tool_schema(t))
                .collect(),
            reasoning_effort: self.disable_reasoning.then_some("none"),
        };

        HttpRequest {
            url: format!("{}/chat/completions", self.base_url),
            headers: vec![
                (
                    "Authorization".to_string(),
                    format!("Bearer {}", params.credential),
                ),
                ("content-type".to_string(), "application/json".to_string()),
                ("accept".to_string(), "text/event-stream".to_string()),
            ],
            body: to_body(&api_request),
        }
    }

    fn format_tool_schema(&self, tool: &ToolDescriptor) -> Value {
        to_body(&ApiTool {
            tool_type: "function",
            function: ApiFunction {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.parameters,
            },
        })
    }

    fn parse_stream_event(&self, data: &str) -> Result<Vec<StreamEvent>, serde_json::Error> {
        let chunk: ApiChunk = serde_json::from_str(data)?;
        if let Some(error) = chunk.error {
            tracing::warn!(provider = %self.kind, %error, "error payload in stream");
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(events);
        };

        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            events.push(StreamEvent::TextDelta(text));
        }
        for call in choice.delta.tool_calls {
            let Some(function) = call.function else {
                continue;
            };
            if let Some(name) = function.name.filter(|n| !n.is_empty()) {
                let id = call
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
                events.push(StreamEvent::ToolCallStart { id, name });
            }
            if let Some(arguments) = function.arguments.filter(|a| !a.is_empty()) {
                events.push(StreamEvent::ToolCallArgsDelta(arguments));
            }
        }
        Ok(events)
    }
}
