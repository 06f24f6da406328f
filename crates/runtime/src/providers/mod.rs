//! LLM provider adapters.
//!
//! Each provider family implements [`ProviderAdapter`] for its wire contract.
//! Callers pick one by [`ProviderKind`]; nothing else branches on the provider.

mod anthropic;
mod openai;

pub use anthropic::AnthropicAdapter;
pub use openai::OpenAiAdapter;

use crate::model::{Message, StreamEvent, ToolDescriptor, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Default `max_tokens` for providers that require one.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Supported provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }

    /// Environment variable conventionally holding this provider's key.
    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// A fully formed HTTP request, independent of any HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl HttpRequest {
    /// First header value with this name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Everything needed to build one provider request.
#[derive(Debug, Clone, Copy)]
pub struct RequestParams<'a> {
    pub messages: &'a [Message],
    pub system_prompt: Option<&'a str>,
    pub model: &'a str,
    pub credential: &'a str,
    pub tools: &'a [ToolDescriptor],
    pub tool_results: &'a [ToolResult],
    pub max_tokens: u32,
}

/// One provider family's wire contract.
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Build the streaming request. Never fails; malformed input degrades.
    fn build_request(&self, params: &RequestParams<'_>) -> HttpRequest;

    /// Translate a descriptor into the provider's function-calling schema.
    fn format_tool_schema(&self, tool: &ToolDescriptor) -> Value;

    /// Map one `data:` payload to normalized events, in order.
    fn parse_stream_event(&self, data: &str) -> Result<Vec<StreamEvent>, serde_json::Error>;

    /// Whether a `data:` payload is the literal end-of-stream marker.
    fn is_sentinel(&self, data: &str) -> bool {
        data == "[DONE]"
    }
}

/// Select the adapter for a provider, optionally overriding its base URL.
pub fn adapter(kind: ProviderKind, base_url: Option<&str>) -> Arc<dyn ProviderAdapter> {
    let base_url = base_url
        .unwrap_or(kind.default_base_url())
        .trim_end_matches('/')
        .to_string();
    match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiAdapter::openai(base_url)),
        ProviderKind::Gemini => Arc::new(OpenAiAdapter::gemini(base_url)),
        ProviderKind::Anthropic => Arc::new(AnthropicAdapter::new(base_url)),
    }
}

/// Serialize a wire struct, substituting an empty object on failure.
pub(crate) fn to_body<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to serialize request body");
        Value::Object(Default::default())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolCall;
    use serde_json::json;

    fn params<'a>(
        messages: &'a [Message],
        tools: &'a [ToolDescriptor],
        results: &'a [ToolResult],
    ) -> RequestParams<'a> {
        RequestParams {
            messages,
            system_prompt: Some("Be brief."),
            model: "test-model",
            credential: "secret",
            tools,
            tool_results: results,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    const ALL: [ProviderKind; 3] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
    ];

    #[test]
    fn empty_tool_list_omits_tools_field() {
        let messages = [Message::user("hi")];
        for kind in ALL {
            let request = adapter(kind, None).build_request(&params(&messages, &[], &[]));
            assert!(request.body.get("tools").is_none(), "{kind} emitted tools");
            assert_eq!(request.body["stream"], json!(true));
        }
    }

    #[test]
    fn tool_results_follow_family_contract() {
        let call = ToolCall::new("call_1", "current_time").with_arguments("{}");
        let messages = [
            Message::user("what time is it?"),
            Message::assistant_tool_calls("", vec![call]),
        ];
        let results = [ToolResult::success("call_1", "09:00")];

        for kind in [ProviderKind::OpenAi, ProviderKind::Gemini] {
            let body = adapter(kind, None)
                .build_request(&params(&messages, &[], &results))
                .body;
            let last = body["messages"].as_array().unwrap().last().unwrap().clone();
            assert_eq!(last["role"], "tool");
            assert_eq!(last["tool_call_id"], "call_1");
            assert_eq!(last["content"], "09:00");
        }

        let body = adapter(ProviderKind::Anthropic, None)
            .build_request(&params(&messages, &[], &results))
            .body;
        let last = body["messages"].as_array().unwrap().last().unwrap().clone();
        assert_eq!(last["role"], "user");
        assert_eq!(last["content"][0]["type"], "tool_result");
        assert_eq!(last["content"][0]["tool_use_id"], "call_1");
    }

    #[test]
    fn base_url_override_and_trailing_slash() {
        let request = adapter(ProviderKind::OpenAi, Some("http://localhost:8080/v1/"))
            .build_request(&params(&[Message::user("hi")], &[], &[]));
        assert_eq!(request.url, "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn provider_kind_parses() {
        assert_eq!("OpenAI".parse::<ProviderKind>(), Ok(ProviderKind::OpenAi));
        assert_eq!("claude".parse::<ProviderKind>(), Ok(ProviderKind::Anthropic));
        assert!("bard".parse::<ProviderKind>().is_err());
        assert_eq!(serde_json::to_string(&ProviderKind::OpenAi).unwrap(), "\"openai\"");
    }
}
