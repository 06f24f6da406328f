//! Policy configuration and enforcement.

use crate::{Error, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lifetime of a broadened grant unless configured otherwise.
pub const DEFAULT_TTL_MINUTES: i64 = 10;
/// Shortest grant lifetime a policy may configure.
pub const MIN_TTL_MINUTES: i64 = 1;
/// Longest grant lifetime a policy may configure: one day.
pub const MAX_TTL_MINUTES: i64 = 24 * 60;

/// Policy configuration loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPolicy {
    /// Tool names exposed to every exchange.
    #[serde(default)]
    pub baseline: BTreeSet<String>,

    /// How long a model-requested grant stays active.
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: i64,
}

fn default_ttl_minutes() -> i64 {
    DEFAULT_TTL_MINUTES
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self {
            baseline: BTreeSet::new(),
            ttl_minutes: DEFAULT_TTL_MINUTES,
        }
    }
}

impl ToolPolicy {
    /// Parse policy from TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        let policy: Self = toml::from_str(toml).map_err(|e| Error::Parse(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Create a policy exposing exactly `names` by default.
    pub fn with_baseline<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            baseline: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn ttl_minutes(mut self, minutes: i64) -> Self {
        self.ttl_minutes = minutes;
        self
    }

    /// Grant lifetime, clamped to the configurable range.
    pub fn ttl(&self) -> TimeDelta {
        TimeDelta::minutes(self.ttl_minutes.clamp(MIN_TTL_MINUTES, MAX_TTL_MINUTES))
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_TTL_MINUTES..=MAX_TTL_MINUTES).contains(&self.ttl_minutes) {
            return Err(Error::Invalid(format!(
                "ttl_minutes must be between {MIN_TTL_MINUTES} and {MAX_TTL_MINUTES}, got {}",
                self.ttl_minutes
            )));
        }
        if let Some(name) = self.baseline.iter().find(|n| n.trim().is_empty()) {
            return Err(Error::Invalid(format!("empty tool name in baseline: {name:?}")));
        }
        Ok(())
    }
}

/// Tools the model asked for, and when it got them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub names: BTreeSet<String>,
    pub granted_at: DateTime<Utc>,
}

/// Result of a visibility check.
#[derive(Debug, Clone)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Session-scoped grant state on top of a [`ToolPolicy`].
#[derive(Debug, Clone)]
pub struct AccessState {
    policy: ToolPolicy,
    grant: Option<Grant>,
}

impl AccessState {
    pub fn new(policy: ToolPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            policy,
            grant: None,
        })
    }

    pub fn policy(&self) -> &ToolPolicy {
        &self.policy
    }

    pub fn grant(&self) -> Option<&Grant> {
        self.grant.as_ref()
    }

    /// Drop the grant if it is older than the TTL.
    ///
    /// Returns the lapsed grant, if any.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Option<Grant> {
        let lapsed = self
            .grant
            .as_ref()
            .is_some_and(|g| now - g.granted_at > self.policy.ttl());
        if !lapsed {
            return None;
        }
        let grant = self.grant.take();
        if let Some(g) = &grant {
            tracing::info!(
                names = ?g.names,
                granted_at = %g.granted_at,
                "tool grant expired, reverting to baseline"
            );
        }
        grant
    }

    /// Replace the broadened set. An empty set clears it.
    pub fn set_granted<I, S>(&mut self, names: I, now: DateTime<Utc>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names
            .into_iter()
            .map(Into::into)
            .filter(|n: &String| !n.trim().is_empty())
            .collect();
        if names.is_empty() {
            if self.grant.take().is_some() {
                tracing::info!("tool grant cleared");
            }
            return;
        }
        tracing::info!(names = ?names, "tool grant updated");
        self.grant = Some(Grant {
            names,
            granted_at: now,
        });
    }

    /// Whether `name` is in baseline ∪ grant.
    ///
    /// Does not expire anything; call [`AccessState::expire`] first.
    pub fn is_allowed(&self, name: &str) -> bool {
        self.policy.baseline.contains(name)
            || self.grant.as_ref().is_some_and(|g| g.names.contains(name))
    }

    /// Expire, then check.
    pub fn check(&mut self, name: &str, now: DateTime<Utc>) -> Decision {
        self.expire(now);
        if self.is_allowed(name) {
            Decision::Allow
        } else {
            Decision::Deny {
                reason: format!("{name} is not in the baseline or an active grant"),
            }
        }
    }
}
