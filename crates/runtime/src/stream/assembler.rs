//! Reassembly of tool calls from streamed fragments.

use crate::model::{StreamEvent, ToolCall};
use uuid::Uuid;

/// Rebuilds complete tool calls from fragment events.
///
/// At most one call is in progress. A new start archives the previous one,
/// and completed calls keep arrival order.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    current: Option<ToolCall>,
    completed: Vec<ToolCall>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one event. Text deltas are ignored.
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::ToolCallStart { id, name } => self.start(id.clone(), name.clone()),
            StreamEvent::ToolCallArgsDelta(text) => self.append(text),
            StreamEvent::StreamEnd => self.finish(),
            StreamEvent::TextDelta(_) => {}
        }
    }

    pub fn start(&mut self, id: String, name: String) {
        self.finish();
        self.current = Some(ToolCall::new(id, name));
    }

    /// Append to the open call, opening an unnamed one if none was announced.
    pub fn append(&mut self, text: &str) {
        let current = self.current.get_or_insert_with(|| {
            let id = format!("call_{}", Uuid::new_v4().simple());
            tracing::debug!(%id, "arguments arrived without a start; opening implicit call");
            ToolCall::new(id, "")
        });
        current.arguments.push_str(text);
    }

    /// Archive the open call, if any.
    pub fn finish(&mut self) {
        if let Some(call) = self.current.take() {
            self.completed.push(call);
        }
    }

    pub fn current(&self) -> Option<&ToolCall> {
        self.current.as_ref()
    }

    pub fn completed(&self) -> &[ToolCall] {
        &self.completed
    }

    pub fn into_completed(self) -> Vec<ToolCall> {
        self.completed
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.completed.clear();
    }
}
