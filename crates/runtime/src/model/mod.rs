//! Conversation and streaming protocol types.

pub mod errors;
pub mod types;

pub use errors::ModelError;
pub use types::{Message, Role, StreamEvent, ToolCall, ToolDescriptor, ToolResult};
