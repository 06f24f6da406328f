use serde::{Deserialize, Serialize};

/// Fixed taxonomy used to group tools for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Information,
    Productivity,
    Communication,
    Media,
    Device,
    Utility,
}

impl ToolCategory {
    /// Every category, in display order.
    pub const ALL: [ToolCategory; 6] = [
        ToolCategory::Information,
        ToolCategory::Productivity,
        ToolCategory::Communication,
        ToolCategory::Media,
        ToolCategory::Device,
        ToolCategory::Utility,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Information => "information",
            Self::Productivity => "productivity",
            Self::Communication => "communication",
            Self::Media => "media",
            Self::Device => "device",
            Self::Utility => "utility",
        }
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
