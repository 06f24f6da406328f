//! Which tools the model may see for the current exchange.

use crate::model::ToolDescriptor;
use crate::tools::ToolRouter;
use chrono::TimeDelta;
use policy::{AccessState, Clock, Decision, Grant, SystemClock, ToolCategory, ToolPolicy};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Name of the built-in tool the model uses to broaden its own allowlist.
pub const ENABLE_TOOLS_NAME: &str = "enable_more_tools";

/// Module name reported for built-in session tools.
pub const SESSION_MODULE: &str = "session";

/// Session-scoped capability gate.
///
/// A tool is visible when its name is in the baseline or an unexpired grant,
/// and its owning module reports itself ready.
pub struct CapabilityGate<C: Clock = SystemClock> {
    state: Mutex<AccessState>,
    router: Arc<ToolRouter>,
    clock: C,
}

impl CapabilityGate<SystemClock> {
    pub fn new(policy: ToolPolicy, router: Arc<ToolRouter>) -> policy::Result<Self> {
        Self::with_clock(policy, router, SystemClock)
    }
}

impl<C: Clock> CapabilityGate<C> {
    pub fn with_clock(policy: ToolPolicy, router: Arc<ToolRouter>, clock: C) -> policy::Result<Self> {
        Ok(Self {
            state: Mutex::new(AccessState::new(policy)?),
            router,
            clock,
        })
    }

    fn state(&self) -> MutexGuard<'_, AccessState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Descriptors visible to the model right now.
    ///
    /// Expiry and filtering happen under one lock.
    pub fn available_tools(&self) -> Vec<ToolDescriptor> {
        let mut state = self.state();
        state.expire(self.clock.now());
        self.ready_descriptors(|name| state.is_allowed(name))
    }

    /// Replace the broadened set. No names clears it back to baseline.
    pub fn set_enabled_tool_names<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = self.clock.now();
        self.state().set_granted(names, now);
    }

    /// Current grant, if any and unexpired.
    pub fn grant(&self) -> Option<Grant> {
        let mut state = self.state();
        state.expire(self.clock.now());
        state.grant().cloned()
    }

    /// How long a grant lasts.
    pub fn ttl(&self) -> TimeDelta {
        self.state().policy().ttl()
    }

    /// Policy-level check for a single name. Readiness is not considered.
    pub fn check(&self, name: &str) -> Decision {
        self.state().check(name, self.clock.now())
    }

    /// Everything that could be enabled, grouped by category.
    ///
    /// Filtered by readiness but not by the allowlist.
    pub fn tool_catalog_by_category(&self) -> BTreeMap<ToolCategory, Vec<ToolDescriptor>> {
        let mut catalog: BTreeMap<ToolCategory, Vec<ToolDescriptor>> = BTreeMap::new();
        for (module, tool) in self.router.routed() {
            if module.is_ready() {
                catalog.entry(module.category()).or_default().push(tool.clone());
            }
        }
        catalog
    }

    /// Descriptor for [`ENABLE_TOOLS_NAME`], listing what can be requested.
    pub fn enable_tools_descriptor(&self) -> ToolDescriptor {
        let mut description = String::from(
            "Request access to additional tools for the next few minutes. \
             Pass the exact names you need; an empty list drops back to the default set.",
        );
        for (category, tools) in self.tool_catalog_by_category() {
            let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
            description.push_str(&format!("\n{category}: {}", names.join(", ")));
        }
        ToolDescriptor::new(
            SESSION_MODULE,
            ENABLE_TOOLS_NAME,
            description,
            json!({
                "type": "object",
                "properties": {
                    "tool_names": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Tool names to enable"
                    }
                },
                "required": ["tool_names"]
            }),
        )
    }

    fn ready_descriptors(&self, allowed: impl Fn(&str) -> bool) -> Vec<ToolDescriptor> {
        self.router
            .routed()
            .filter(|(module, tool)| allowed(&tool.name) && module.is_ready())
            .map(|(_, tool)| tool.clone())
            .collect()
    }
}
