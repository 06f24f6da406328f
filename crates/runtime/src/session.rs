//! Conversation controller.

use crate::gate::{CapabilityGate, ENABLE_TOOLS_NAME};
use crate::model::{Message, ToolCall, ToolResult};
use crate::orchestrator::{ExchangeRequest, Outcome, StreamingOrchestrator};
use crate::providers::ProviderKind;
use crate::speech::SpeechSink;
use crate::tools::ToolRouter;
use crate::transport::{ReqwestTransport, Transport};
use crate::{Error, Result};
use policy::{Clock, Decision, SystemClock};
use serde::Deserialize;
use std::sync::Arc;

/// Tool rounds allowed per user turn unless configured otherwise.
pub const DEFAULT_MAX_ROUNDS: usize = 5;

/// Who to talk to and how.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub credential: String,
    pub system_prompt: Option<String>,
    pub max_rounds: usize,
}

impl SessionConfig {
    pub fn new(provider: ProviderKind, model: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            credential: credential.into(),
            system_prompt: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }
}

#[derive(Debug, Deserialize)]
struct EnableToolsArgs {
    #[serde(default)]
    tool_names: Vec<String>,
}

/// A conversation session.
///
/// Owns the history and runs the tool loop: the model may call tools, the
/// results go back in the next exchange, until it answers with text.
pub struct Session<T: Transport = ReqwestTransport, C: Clock = SystemClock> {
    orchestrator: StreamingOrchestrator<T>,
    router: Arc<ToolRouter>,
    gate: CapabilityGate<C>,
    config: SessionConfig,
    messages: Vec<Message>,
}

impl<T: Transport, C: Clock> Session<T, C> {
    pub fn new(
        orchestrator: StreamingOrchestrator<T>,
        router: Arc<ToolRouter>,
        gate: CapabilityGate<C>,
        config: SessionConfig,
    ) -> Self {
        Self {
            orchestrator,
            router,
            gate,
            config,
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn gate(&self) -> &CapabilityGate<C> {
        &self.gate
    }

    pub fn orchestrator(&self) -> &StreamingOrchestrator<T> {
        &self.orchestrator
    }

    /// Forget the conversation. The tool grant is kept.
    pub fn clear_history(&mut self) {
        self.messages.clear();
    }

    /// Send a user message and get the assistant's final answer.
    ///
    /// Sentences reach `sink` as they stream, across every round.
    pub async fn chat(&mut self, user_input: &str, sink: &mut dyn SpeechSink) -> Result<String> {
        self.messages.push(Message::user(user_input));

        let mut pending: Vec<ToolResult> = Vec::new();
        for round in 0..=self.config.max_rounds {
            let mut tools = self.gate.available_tools();
            tools.push(self.gate.enable_tools_descriptor());

            let exchange = self.orchestrator.send(ExchangeRequest {
                provider: self.config.provider,
                model: &self.config.model,
                credential: &self.config.credential,
                system_prompt: self.config.system_prompt.as_deref(),
                messages: &self.messages,
                tools: &tools,
                tool_results: &pending,
            })?;
            self.messages.extend(pending.drain(..).map(|r| Message::tool(&r)));

            match exchange.finish(&mut *sink).await? {
                Outcome::Response(text) => {
                    self.messages.push(Message::assistant(text.clone()));
                    return Ok(text);
                }
                Outcome::ToolCalls(calls) => {
                    if round == self.config.max_rounds {
                        break;
                    }
                    let text = self.orchestrator.partial_text().borrow().clone();
                    tracing::debug!(round, calls = calls.len(), "running tool round");
                    pending = self.run_tools(&calls).await;
                    self.messages.push(Message::assistant_tool_calls(text, calls));
                }
            }
        }

        Err(Error::InvalidState(format!(
            "model still calling tools after {} rounds",
            self.config.max_rounds
        )))
    }

    /// Stop whatever the model is saying now.
    pub fn interrupt(&self) {
        self.orchestrator.cancel();
    }

    async fn run_tools(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = if call.name == ENABLE_TOOLS_NAME {
                self.enable_tools(call)
            } else {
                match self.gate.check(&call.name) {
                    Decision::Allow => self.router.dispatch(call).await,
                    Decision::Deny { reason } => {
                        tracing::warn!(tool = %call.name, %reason, "model called a tool it was not given");
                        ToolResult::error(&call.id, reason)
                    }
                }
            };
            results.push(result);
        }
        results
    }

    fn enable_tools(&self, call: &ToolCall) -> ToolResult {
        let args: EnableToolsArgs = match serde_json::from_value(call.arguments_value()) {
            Ok(args) => args,
            Err(e) => return ToolResult::error(&call.id, format!("invalid input: {e}")),
        };
        if args.tool_names.is_empty() {
            self.gate.set_enabled_tool_names(Vec::<String>::new());
            return ToolResult::success(&call.id, "Extra tools disabled. Back to the default set.");
        }

        let (known, unknown): (Vec<String>, Vec<String>) = args
            .tool_names
            .into_iter()
            .partition(|name| self.router.owner(name).is_some());
        if known.is_empty() {
            return ToolResult::error(&call.id, format!("unknown tools: {}", unknown.join(", ")));
        }

        let mut content = format!(
            "Enabled for {} minutes: {}.",
            self.gate.ttl().num_minutes(),
            known.join(", ")
        );
        if !unknown.is_empty() {
            content.push_str(&format!(" Unknown, ignored: {}.", unknown.join(", ")));
        }
        self.gate.set_enabled_tool_names(known);
        ToolResult::success(&call.id, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelError, Role};
    use crate::orchestrator::OrchestratorConfig;
    use crate::providers::HttpRequest;
    use crate::tools::ToolModule;
    use crate::tools::testing::FakeModule;
    use crate::transport::StreamResponse;
    use bytes::Bytes;
    use futures::StreamExt;
    use policy::{ManualClock, ToolCategory, ToolPolicy};
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies with one canned body per request and remembers the requests.
    #[derive(Clone, Default)]
    struct Canned {
        bodies: Arc<Mutex<VecDeque<String>>>,
        requests: Arc<Mutex<Vec<HttpRequest>>>,
    }

    impl Canned {
        fn new(bodies: &[String]) -> Self {
            let canned = Self::default();
            canned.bodies.lock().unwrap().extend(bodies.iter().cloned());
            canned
        }

        fn request_bodies(&self) -> Vec<Value> {
            self.requests.lock().unwrap().iter().map(|r| r.body.clone()).collect()
        }
    }

    impl Transport for Canned {
        async fn open(&self, request: HttpRequest) -> std::result::Result<StreamResponse, ModelError> {
            self.requests.lock().unwrap().push(request);
            let body = self.bodies.lock().unwrap().pop_front().unwrap_or_default();
            Ok(StreamResponse {
                status: 200,
                body: futures::stream::iter([Ok(Bytes::from(body))]).boxed(),
            })
        }
    }

    fn text(content: &str) -> String {
        format!(
            "data: {}\n\ndata: [DONE]\n",
            json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    fn call(id: &str, name: &str, arguments: Value) -> String {
        let start = json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": id, "function": {"name": name, "arguments": ""}}
        ]}}]});
        let args = json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "function": {"arguments": arguments.to_string()}}
        ]}}]});
        format!("data: {start}\n\ndata: {args}\n\ndata: [DONE]\n")
    }

    fn session(bodies: &[String]) -> (Session<Canned, ManualClock>, Canned) {
        let transport = Canned::new(bodies);
        let router = Arc::new(ToolRouter::new(vec![
            Arc::new(FakeModule::new("clock", &["current_time"]).with_category(ToolCategory::Utility))
                as Arc<dyn ToolModule>,
            Arc::new(
                FakeModule::new("calendar", &["list_events"]).with_category(ToolCategory::Productivity),
            ) as Arc<dyn ToolModule>,
        ]));
        let gate = CapabilityGate::with_clock(
            ToolPolicy::with_baseline(["current_time"]),
            Arc::clone(&router),
            ManualClock::default(),
        )
        .unwrap();
        let orchestrator =
            StreamingOrchestrator::with_transport(transport.clone(), OrchestratorConfig::default());
        let config = SessionConfig::new(ProviderKind::OpenAi, "gpt-test", "sk-test")
            .with_system("Be brief.")
            .with_max_rounds(2);
        (Session::new(orchestrator, router, gate, config), transport)
    }

    fn tool_names(body: &Value) -> Vec<String> {
        body["tools"]
            .as_array()
            .map(|tools| {
                tools
                    .iter()
                    .filter_map(|t| t["function"]["name"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn plain_answer_is_spoken_and_recorded() {
        let (mut session, _) = session(&[text("Hello there. How can I help?")]);
        let mut spoken = Vec::new();
        let answer = session
            .chat("hi", &mut |s: &str| spoken.push(s.to_string()))
            .await
            .unwrap();

        assert_eq!(answer, "Hello there. How can I help?");
        assert_eq!(spoken, vec!["Hello there.", "How can I help?"]);
        let roles: Vec<Role> = session.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn enable_then_call_granted_tool() {
        let (mut session, transport) = session(&[
            call("call_1", ENABLE_TOOLS_NAME, json!({"tool_names": ["list_events", "teleport"]})),
            call("call_2", "list_events", json!({"day": "today"})),
            text("You have two events."),
        ]);
        let answer = session.chat("what's on today?", &mut |_: &str| {}).await.unwrap();
        assert_eq!(answer, "You have two events.");

        let bodies = transport.request_bodies();
        assert_eq!(bodies.len(), 3);
        assert_eq!(tool_names(&bodies[0]), vec!["current_time", ENABLE_TOOLS_NAME]);
        assert_eq!(
            tool_names(&bodies[1]),
            vec!["current_time", "list_events", ENABLE_TOOLS_NAME]
        );

        let enable_result = bodies[1]["messages"].as_array().unwrap().last().unwrap().clone();
        assert_eq!(enable_result["role"], "tool");
        assert_eq!(enable_result["tool_call_id"], "call_1");
        let content = enable_result["content"].as_str().unwrap();
        assert!(content.contains("Enabled for 10 minutes: list_events."), "{content}");
        assert!(content.contains("teleport"), "{content}");

        let tool_result = bodies[2]["messages"].as_array().unwrap().last().unwrap().clone();
        assert_eq!(tool_result["content"], "calendar:list_events:{\"day\":\"today\"}");

        let roles: Vec<Role> = session.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::User,
                Role::Assistant,
                Role::Tool,
                Role::Assistant,
                Role::Tool,
                Role::Assistant
            ]
        );
        assert!(session.gate().grant().is_some());
    }

    #[tokio::test]
    async fn ungranted_tool_call_becomes_error_result() {
        let (mut session, transport) = session(&[
            call("call_1", "list_events", json!({})),
            text("I can't see your calendar."),
        ]);
        session.chat("what's on today?", &mut |_: &str| {}).await.unwrap();

        let bodies = transport.request_bodies();
        let result = bodies[1]["messages"].as_array().unwrap().last().unwrap().clone();
        assert_eq!(result["tool_call_id"], "call_1");
        assert!(
            result["content"]
                .as_str()
                .unwrap()
                .contains("not in the baseline")
        );
    }

    #[tokio::test]
    async fn empty_enable_list_clears_grant() {
        let (mut session, _) = session(&[
            call("call_1", ENABLE_TOOLS_NAME, json!({"tool_names": []})),
            text("Done."),
        ]);
        session.gate().set_enabled_tool_names(["list_events"]);
        session.chat("fewer tools please", &mut |_: &str| {}).await.unwrap();
        assert!(session.gate().grant().is_none());
    }

    #[tokio::test]
    async fn stops_after_max_rounds() {
        let looping = call("call_x", "current_time", json!({}));
        let (mut session, transport) = session(&[looping.clone(), looping.clone(), looping]);
        let err = session.chat("time?", &mut |_: &str| {}).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(transport.request_bodies().len(), 3);
    }

    #[tokio::test]
    async fn empty_credential_never_reaches_transport() {
        let (mut session, transport) = session(&[text("unused")]);
        session.config.credential = "  ".into();
        let err = session.chat("hi", &mut |_: &str| {}).await.unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::Validation(_))));
        assert!(transport.request_bodies().is_empty());
    }
}
