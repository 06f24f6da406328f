//! In-crate test doubles.

use crate::model::ToolDescriptor;
use crate::tools::{ToolError, ToolModule};
use async_trait::async_trait;
use policy::ToolCategory;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};

/// Echoes `module:tool:arguments` back; readiness can be toggled.
pub(crate) struct FakeModule {
    name: String,
    category: ToolCategory,
    tools: Vec<ToolDescriptor>,
    ready: AtomicBool,
}

impl FakeModule {
    pub(crate) fn new(name: &str, tools: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            category: ToolCategory::Information,
            tools: tools
                .iter()
                .map(|tool| {
                    ToolDescriptor::new(
                        name,
                        *tool,
                        format!("{tool} from {name}"),
                        json!({"type": "object", "properties": {}}),
                    )
                })
                .collect(),
            ready: AtomicBool::new(true),
        }
    }

    pub(crate) fn with_category(mut self, category: ToolCategory) -> Self {
        self.category = category;
        self
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

#[async_trait]
impl ToolModule for FakeModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> ToolCategory {
        self.category
    }

    fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, ToolError> {
        if !self.tools.iter().any(|t| t.name == name) {
            return Err(ToolError::UnknownTool(name.to_string()));
        }
        Ok(format!("{}:{name}:{arguments}", self.name))
    }
}
