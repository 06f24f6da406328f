//! Tool modules and routing.

mod clock;
pub mod errors;
mod module;
mod router;
#[cfg(test)]
pub(crate) mod testing;

pub use clock::{CURRENT_TIME, ClockTools};
pub use errors::ToolError;
pub use module::ToolModule;
pub use router::ToolRouter;
