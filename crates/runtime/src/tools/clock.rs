//! Built-in clock tools.

use crate::model::ToolDescriptor;
use crate::tools::{ToolError, ToolModule};
use async_trait::async_trait;
use chrono::{Local, Utc};
use policy::ToolCategory;
use serde::Deserialize;
use serde_json::{Value, json};

pub const CURRENT_TIME: &str = "current_time";

/// Answers "what time is it". Always ready.
pub struct ClockTools {
    tools: Vec<ToolDescriptor>,
}

#[derive(Debug, Default, Deserialize)]
struct CurrentTimeArgs {
    #[serde(default)]
    utc: bool,
}

impl ClockTools {
    pub const MODULE: &'static str = "clock";

    pub fn new() -> Self {
        Self {
            tools: vec![ToolDescriptor::new(
                Self::MODULE,
                CURRENT_TIME,
                "Get the current date and time.",
                json!({
                    "type": "object",
                    "properties": {
                        "utc": {
                            "type": "boolean",
                            "description": "Return UTC instead of local time"
                        }
                    }
                }),
            )],
        }
    }
}

impl Default for ClockTools {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolModule for ClockTools {
    fn name(&self) -> &str {
        Self::MODULE
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Utility
    }

    fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, ToolError> {
        if name != CURRENT_TIME {
            return Err(ToolError::UnknownTool(name.to_string()));
        }
        let args: CurrentTimeArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidInput(e.to_string()))?;
        Ok(if args.utc {
            Utc::now().to_rfc3339()
        } else {
            Local::now().to_rfc3339()
        })
    }
}
