//! Single-flight streaming exchanges.
//!
//! [`StreamingOrchestrator::send`] builds a provider request, opens the
//! stream on a spawned task and hands back an [`Exchange`] that yields
//! [`ExchangeEvent`]s. Calling `send` again cancels whatever exchange is still
//! running before the new one starts.

use crate::model::{Message, ModelError, StreamEvent, ToolCall, ToolDescriptor, ToolResult};
use crate::providers::{self, DEFAULT_MAX_TOKENS, HttpRequest, ProviderKind, RequestParams};
use crate::speech::{SentenceChunker, SpeechSink};
use crate::stream::{LineBuffer, LineOutcome, StreamDecoder, ToolCallAssembler, ensure_success};
use crate::transport::{ReqwestTransport, Transport};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// How a completed exchange ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Plain answer, the full concatenated text.
    Response(String),
    /// The model asked for tools, in arrival order.
    ToolCalls(Vec<ToolCall>),
}

/// Events of one exchange, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeEvent {
    /// A speakable sentence.
    Sentence(String),
    /// Terminal: the stream ended normally.
    Completed(Outcome),
    /// Terminal: the exchange failed. Sentences already delivered stand.
    Failed(ModelError),
}

/// Everything needed for one request.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeRequest<'a> {
    pub provider: ProviderKind,
    pub model: &'a str,
    pub credential: &'a str,
    pub system_prompt: Option<&'a str>,
    pub messages: &'a [Message],
    pub tools: &'a [ToolDescriptor],
    pub tool_results: &'a [ToolResult],
}

/// Endpoint overrides and request limits.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub base_urls: HashMap<ProviderKind, String>,
    pub max_tokens: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            base_urls: HashMap::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl OrchestratorConfig {
    /// Point `kind` at a different endpoint (proxies, tests).
    pub fn base_url(mut self, kind: ProviderKind, url: impl Into<String>) -> Self {
        self.base_urls.insert(kind, url.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

struct Active {
    id: u64,
    cancel: CancellationToken,
}

struct Shared {
    active: Mutex<Option<Active>>,
    partial: watch::Sender<String>,
    last_error: watch::Sender<Option<ModelError>>,
    next_id: AtomicU64,
}

impl Shared {
    fn active(&self) -> MutexGuard<'_, Option<Active>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cancel the active exchange if `matches` accepts its id.
    fn cancel_where(&self, matches: impl Fn(u64) -> bool) {
        let mut active = self.active();
        let Some(prior) = active.take_if(|a| matches(a.id)) else {
            return;
        };
        tracing::debug!(exchange = prior.id, "cancelling exchange");
        prior.cancel.cancel();
        self.partial.send_replace(String::new());
    }
}

/// Runs at most one exchange at a time.
pub struct StreamingOrchestrator<T: Transport = ReqwestTransport> {
    transport: Arc<T>,
    config: OrchestratorConfig,
    shared: Arc<Shared>,
}

impl StreamingOrchestrator<ReqwestTransport> {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_transport(ReqwestTransport::new(), config)
    }
}

impl<T: Transport> StreamingOrchestrator<T> {
    pub fn with_transport(transport: T, config: OrchestratorConfig) -> Self {
        let (partial, _) = watch::channel(String::new());
        let (last_error, _) = watch::channel(None);
        Self {
            transport: Arc::new(transport),
            config,
            shared: Arc::new(Shared {
                active: Mutex::new(None),
                partial,
                last_error,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Start an exchange, replacing any that is still running.
    ///
    /// An empty credential fails here, before anything touches the network.
    pub fn send(&self, request: ExchangeRequest<'_>) -> Result<Exchange, ModelError> {
        self.cancel();

        if request.credential.trim().is_empty() {
            let err = ModelError::Validation(format!("no API key for {}", request.provider));
            self.shared.last_error.send_replace(Some(err.clone()));
            return Err(err);
        }

        let base_url = self.config.base_urls.get(&request.provider).map(String::as_str);
        let adapter = providers::adapter(request.provider, base_url);
        let http = adapter.build_request(&RequestParams {
            messages: request.messages,
            system_prompt: request.system_prompt,
            model: request.model,
            credential: request.credential,
            tools: request.tools,
            tool_results: request.tool_results,
            max_tokens: self.config.max_tokens,
        });

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (events, rx) = mpsc::unbounded_channel();
        {
            let mut active = self.shared.active();
            *active = Some(Active {
                id,
                cancel: cancel.clone(),
            });
            self.shared.partial.send_replace(String::new());
            self.shared.last_error.send_replace(None);
        }

        tracing::info!(
            exchange = id,
            provider = %request.provider,
            model = request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            tool_results = request.tool_results.len(),
            "exchange started"
        );

        let publisher = Publisher {
            id,
            shared: Arc::clone(&self.shared),
            cancel: cancel.clone(),
            events,
        };
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let decoder = StreamDecoder::new(adapter);
            let result = run(transport.as_ref(), http, &decoder, &publisher).await;
            publisher.finish(result);
        });

        Ok(Exchange {
            id,
            events: rx,
            cancel,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Cancel the running exchange, if any. No terminal event is delivered.
    pub fn cancel(&self) {
        self.shared.cancel_where(|_| true);
    }

    pub fn is_active(&self) -> bool {
        self.shared.active().is_some()
    }

    /// Text streamed so far by the current (or last completed) exchange.
    pub fn partial_text(&self) -> watch::Receiver<String> {
        self.shared.partial.subscribe()
    }

    /// Error that ended the last exchange, cleared when a new one starts.
    pub fn last_error(&self) -> watch::Receiver<Option<ModelError>> {
        self.shared.last_error.subscribe()
    }
}

/// Handle to one exchange.
///
/// Once the exchange is cancelled or replaced, `recv` returns `None` even if
/// events were already queued.
pub struct Exchange {
    id: u64,
    events: mpsc::UnboundedReceiver<ExchangeEvent>,
    cancel: CancellationToken,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Exchange {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel this exchange only. A newer exchange is left running.
    pub fn cancel(&self) {
        self.shared.cancel_where(|id| id == self.id);
        self.cancel.cancel();
    }

    pub async fn recv(&mut self) -> Option<ExchangeEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.events.recv() => event,
        }
    }

    /// Drive the exchange to its end, handing sentences to `sink`.
    pub async fn finish(mut self, sink: &mut dyn SpeechSink) -> Result<Outcome, ModelError> {
        while let Some(event) = self.recv().await {
            match event {
                ExchangeEvent::Sentence(sentence) => sink.on_sentence_ready(&sentence),
                ExchangeEvent::Completed(outcome) => return Ok(outcome),
                ExchangeEvent::Failed(err) => return Err(err),
            }
        }
        Err(ModelError::Cancelled)
    }
}

/// Emits on behalf of one exchange, but only while it is still the current one.
///
/// Every emission checks currency under the `active` lock, so nothing leaks
/// out after `cancel` returns.
struct Publisher {
    id: u64,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<ExchangeEvent>,
}

impl Publisher {
    fn is_current(&self, active: &Option<Active>) -> bool {
        !self.cancel.is_cancelled() && matches!(active, Some(a) if a.id == self.id)
    }

    fn partial(&self, text: &str) {
        let active = self.shared.active();
        if self.is_current(&active) {
            self.shared.partial.send_replace(text.to_string());
        }
    }

    fn sentence(&self, sentence: String) {
        let active = self.shared.active();
        if self.is_current(&active) {
            let _ = self.events.send(ExchangeEvent::Sentence(sentence));
        }
    }

    fn finish(self, result: Result<Outcome, ModelError>) {
        let mut active = self.shared.active();
        let current = self.is_current(&active);
        if matches!(&*active, Some(a) if a.id == self.id) {
            *active = None;
        }
        if !current {
            tracing::debug!(exchange = self.id, "exchange ended after cancellation");
            return;
        }

        match result {
            Ok(outcome) => {
                match &outcome {
                    Outcome::Response(text) => {
                        tracing::info!(exchange = self.id, chars = text.chars().count(), "response complete")
                    }
                    Outcome::ToolCalls(calls) => {
                        tracing::info!(exchange = self.id, calls = calls.len(), "tool calls received")
                    }
                }
                let _ = self.events.send(ExchangeEvent::Completed(outcome));
            }
            Err(ModelError::Cancelled) => {}
            Err(err) => {
                tracing::error!(exchange = self.id, error = %err, "exchange failed");
                self.shared.last_error.send_replace(Some(err.clone()));
                let _ = self.events.send(ExchangeEvent::Failed(err));
            }
        }
    }
}

async fn run<T: Transport>(
    transport: &T,
    request: HttpRequest,
    decoder: &StreamDecoder,
    publisher: &Publisher,
) -> Result<Outcome, ModelError> {
    let cancel = &publisher.cancel;

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ModelError::Cancelled),
        response = transport.open(request) => response?,
    };
    let mut body = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ModelError::Cancelled),
        body = ensure_success(response) => body?,
    };

    let mut state = ExchangeState::default();
    let mut lines = LineBuffer::new();
    'read: loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ModelError::Cancelled),
            chunk = body.next() => chunk,
        };
        let Some(chunk) = chunk else {
            break;
        };
        lines.push(&chunk?)?;
        while let Some(line) = lines.next_line() {
            if state.consume(decoder, &line, publisher) {
                break 'read;
            }
        }
    }
    if !state.ended {
        if let Some(line) = lines.finish() {
            state.consume(decoder, &line, publisher);
        }
    }

    state.complete(publisher)
}

/// Per-exchange decoding state. Nothing here outlives the exchange.
#[derive(Default)]
struct ExchangeState {
    text: String,
    chunker: SentenceChunker,
    assembler: ToolCallAssembler,
    data_lines: usize,
    other_lines: usize,
    ended: bool,
}

impl ExchangeState {
    /// Returns true once the stream has signalled its end.
    fn consume(&mut self, decoder: &StreamDecoder, line: &str, publisher: &Publisher) -> bool {
        match decoder.decode_line(line) {
            LineOutcome::Blank => {}
            LineOutcome::Ignored => self.other_lines += 1,
            LineOutcome::Done => {
                self.data_lines += 1;
                self.ended = true;
            }
            LineOutcome::Events(events) => {
                self.data_lines += 1;
                for event in events {
                    self.apply(event, publisher);
                    if self.ended {
                        break;
                    }
                }
            }
        }
        self.ended
    }

    fn apply(&mut self, event: StreamEvent, publisher: &Publisher) {
        match &event {
            StreamEvent::TextDelta(delta) => {
                self.text.push_str(delta);
                publisher.partial(&self.text);
                self.chunker.push(delta);
                for sentence in self.chunker.sentences() {
                    publisher.sentence(sentence);
                }
            }
            StreamEvent::StreamEnd => self.ended = true,
            StreamEvent::ToolCallStart { .. } | StreamEvent::ToolCallArgsDelta(_) => {}
        }
        self.assembler.apply(&event);
    }

    fn complete(mut self, publisher: &Publisher) -> Result<Outcome, ModelError> {
        if self.data_lines == 0 && self.other_lines > 0 {
            return Err(ModelError::Parse(
                "response body contained no stream data".to_string(),
            ));
        }
        if let Some(rest) = self.chunker.flush() {
            publisher.sentence(rest);
        }
        self.assembler.finish();
        let calls = self.assembler.into_completed();
        if calls.is_empty() {
            Ok(Outcome::Response(self.text))
        } else {
            Ok(Outcome::ToolCalls(calls))
        }
    }
}
