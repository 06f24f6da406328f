//! Tool module trait.

use crate::model::ToolDescriptor;
use crate::tools::ToolError;
use async_trait::async_trait;
use policy::ToolCategory;
use serde_json::Value;

/// A collaborator that owns and executes a set of tools.
///
/// This is the boundary between the model loop and side effects. The router
/// never looks inside a module; it only asks which names it owns, whether it
/// is ready, and to execute.
#[async_trait]
pub trait ToolModule: Send + Sync {
    /// Stable module name, referenced by [`ToolDescriptor::module`].
    fn name(&self) -> &str;

    fn category(&self) -> ToolCategory;

    /// Tools this module owns, in a fixed order.
    fn tools(&self) -> &[ToolDescriptor];

    /// Whether the module can execute right now (credential present,
    /// dependency injected). Queried on every use, never cached.
    fn is_ready(&self) -> bool {
        true
    }

    /// Execute a tool by name.
    ///
    /// Only fails with [`ToolError::UnknownTool`] for names it does not own;
    /// other errors describe execution failures.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, ToolError>;
}
