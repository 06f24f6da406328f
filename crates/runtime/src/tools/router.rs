//! Name-based dispatch to tool modules.

use crate::model::{ToolCall, ToolDescriptor, ToolResult};
use crate::tools::{ToolError, ToolModule};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Routes tool calls to the module that owns the name.
///
/// The name→module table is built when modules are registered. When two
/// modules claim the same name, the one registered first wins.
#[derive(Default)]
pub struct ToolRouter {
    modules: Vec<Arc<dyn ToolModule>>,
    routes: HashMap<String, usize>,
}

impl ToolRouter {
    pub fn new(modules: Vec<Arc<dyn ToolModule>>) -> Self {
        let mut router = Self {
            modules,
            routes: HashMap::new(),
        };
        router.rebuild();
        router
    }

    /// Create a router with no modules.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Arc<dyn ToolModule>) {
        self.modules.push(module);
        self.rebuild();
    }

    /// Recompute the routing table from the registered modules.
    pub fn rebuild(&mut self) {
        self.routes.clear();
        for (index, module) in self.modules.iter().enumerate() {
            for tool in module.tools() {
                if let Some(&owner) = self.routes.get(&tool.name) {
                    tracing::warn!(
                        tool = %tool.name,
                        module = module.name(),
                        owner = self.modules[owner].name(),
                        "duplicate tool name ignored"
                    );
                    continue;
                }
                self.routes.insert(tool.name.clone(), index);
            }
        }
    }

    /// Modules in registration order.
    pub fn modules(&self) -> &[Arc<dyn ToolModule>] {
        &self.modules
    }

    /// The module that owns `name`, ready or not.
    pub fn owner(&self, name: &str) -> Option<&Arc<dyn ToolModule>> {
        self.routes.get(name).map(|&i| &self.modules[i])
    }

    /// Every routed tool paired with the module that owns it, in registration
    /// order. Names shadowed by an earlier module are skipped.
    pub fn routed(&self) -> impl Iterator<Item = (&Arc<dyn ToolModule>, &ToolDescriptor)> {
        self.modules.iter().enumerate().flat_map(move |(index, module)| {
            module
                .tools()
                .iter()
                .filter(move |tool| self.routes.get(&tool.name) == Some(&index))
                .map(move |tool| (module, tool))
        })
    }

    /// Execute a tool by name.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, ToolError> {
        let module = self
            .owner(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        if !module.is_ready() {
            return Err(ToolError::ModuleUnavailable(module.name().to_string()));
        }
        tracing::debug!(tool = name, module = module.name(), "calling tool");
        module.call_tool(name, arguments).await
    }

    /// Execute one call, folding any failure into an error result.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let outcome = match parse_arguments(&call.arguments) {
            Ok(arguments) => self.call_tool(&call.name, arguments).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(content) => ToolResult::success(&call.id, content),
            Err(e) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "tool call failed");
                ToolResult::error(&call.id, e.to_string())
            }
        }
    }

    /// Execute a batch sequentially, in arrival order.
    pub async fn dispatch_all(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.dispatch(call).await);
        }
        results
    }
}

fn parse_arguments(raw: &str) -> Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidInput(format!("arguments: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::FakeModule;
    use serde_json::json;

    fn router() -> (ToolRouter, Arc<FakeModule>) {
        let weather = Arc::new(FakeModule::new("weather", &["forecast"]));
        let shadow = Arc::new(FakeModule::new("shadow", &["forecast", "alarm"]));
        let router = ToolRouter::new(vec![
            weather.clone() as Arc<dyn ToolModule>,
            shadow as Arc<dyn ToolModule>,
        ]);
        (router, weather)
    }

    #[tokio::test]
    async fn first_registered_module_wins() {
        let (router, _) = router();
        assert_eq!(router.owner("forecast").unwrap().name(), "weather");
        assert_eq!(router.owner("alarm").unwrap().name(), "shadow");
        let out = router.call_tool("forecast", json!({"city": "Seoul"})).await.unwrap();
        assert_eq!(out, "weather:forecast:{\"city\":\"Seoul\"}");
    }

    #[tokio::test]
    async fn unknown_and_unavailable() {
        let (router, weather) = router();
        assert_eq!(
            router.call_tool("teleport", json!({})).await,
            Err(ToolError::UnknownTool("teleport".into()))
        );

        weather.set_ready(false);
        assert_eq!(
            router.call_tool("forecast", json!({})).await,
            Err(ToolError::ModuleUnavailable("weather".into()))
        );
    }

    #[tokio::test]
    async fn dispatch_wraps_errors_into_results() {
        let (router, _) = router();
        let calls = [
            ToolCall::new("1", "forecast").with_arguments("{\"city\":\"Busan\"}"),
            ToolCall::new("2", "forecast").with_arguments("{\"city\":"),
            ToolCall::new("3", "teleport"),
            ToolCall::new("4", "alarm"),
        ];
        let results = router.dispatch_all(&calls).await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0], ToolResult::success("1", "weather:forecast:{\"city\":\"Busan\"}"));
        assert!(results[1].is_error && results[1].content.contains("invalid input"));
        assert_eq!(results[2], ToolResult::error("3", "unknown tool: teleport"));
        assert_eq!(results[3], ToolResult::success("4", "shadow:alarm:{}"));
    }

    #[test]
    fn routed_skips_shadowed_names() {
        let (router, _) = router();
        let routed: Vec<(&str, &str)> = router
            .routed()
            .map(|(module, tool)| (module.name(), tool.name.as_str()))
            .collect();
        assert_eq!(routed, vec![("weather", "forecast"), ("shadow", "alarm")]);
    }

    #[tokio::test]
    async fn register_rebuilds_routes() {
        let mut router = ToolRouter::empty();
        assert!(router.owner("forecast").is_none());
        router.register(Arc::new(FakeModule::new("weather", &["forecast"])));
        assert!(router.owner("forecast").is_some());
    }
}
