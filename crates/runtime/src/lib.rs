//! Murmur runtime: streaming model exchanges, tool routing and speech chunking.
//!
//! # Overview
//!
//! The runtime is organized around these concepts:
//!
//! - **ProviderAdapter**: one per provider family. Builds the HTTP request
//!   and maps each streamed line to [`StreamEvent`]s.
//! - **StreamingOrchestrator**: runs one exchange at a time. A new `send`
//!   cancels the one still running.
//! - **SentenceChunker**: cuts streamed text into speakable sentences.
//! - **CapabilityGate**: decides which tools the model sees, from a baseline
//!   plus a short-lived grant the model can ask for.
//! - **ToolRouter**: dispatches calls to the module that owns the name.
//! - **Session**: the conversation loop tying all of the above together.
//!
//! # Example
//!
//! ```no_run
//! use runtime::{
//!     CapabilityGate, ClockTools, OrchestratorConfig, ProviderKind, Session,
//!     SessionConfig, StreamingOrchestrator, ToolModule, ToolRouter,
//! };
//! use policy::ToolPolicy;
//! use std::sync::Arc;
//!
//! # async fn example() -> runtime::Result<()> {
//! let router = Arc::new(ToolRouter::new(vec![Arc::new(ClockTools::new()) as Arc<dyn ToolModule>]));
//! let gate = CapabilityGate::new(ToolPolicy::with_baseline(["current_time"]), router.clone())?;
//! let orchestrator = StreamingOrchestrator::new(OrchestratorConfig::default());
//! let config = SessionConfig::new(ProviderKind::OpenAi, "gpt-4o-mini", "sk-...");
//!
//! let mut session = Session::new(orchestrator, router, gate, config);
//! let answer = session.chat("What time is it?", &mut |s: &str| println!("{s}")).await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

mod error;
pub mod gate;
pub mod model;
pub mod orchestrator;
pub mod providers;
mod session;
pub mod speech;
pub mod stream;
pub mod tools;
pub mod transport;

pub use error::{Error, Result};

pub use model::{
    Message, ModelError, Role, StreamEvent, ToolCall, ToolDescriptor, ToolResult,
};

pub use providers::{HttpRequest, ProviderAdapter, ProviderKind, RequestParams};

pub use gate::{CapabilityGate, ENABLE_TOOLS_NAME};
pub use orchestrator::{
    Exchange, ExchangeEvent, ExchangeRequest, OrchestratorConfig, Outcome, StreamingOrchestrator,
};
pub use session::{DEFAULT_MAX_ROUNDS, Session, SessionConfig};
pub use speech::{SentenceChunker, SpeechSink};
pub use stream::{StreamDecoder, ToolCallAssembler};
pub use tools::{ClockTools, ToolError, ToolModule, ToolRouter};
pub use transport::{ByteStream, ReqwestTransport, StreamResponse, Transport};
