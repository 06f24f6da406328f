//! Tool grant policy.
//!
//! Core principle: **a tool is only visible to the model when the policy says so.**
//!
//! The policy is made of an immutable baseline allowlist that every exchange
//! sees, plus an optional broadened grant the model can request for itself.
//! Grants carry a timestamp and lapse after a TTL, reverting to the baseline.

mod capability;
mod clock;
mod error;
mod policy;

pub use capability::ToolCategory;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use policy::{
    AccessState, DEFAULT_TTL_MINUTES, Decision, Grant, MAX_TTL_MINUTES, MIN_TTL_MINUTES,
    ToolPolicy,
};
