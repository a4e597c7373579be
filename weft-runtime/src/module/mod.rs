//! User-facing modules and their lifecycle.

mod context;
mod host;
#[allow(clippy::module_inception)]
mod module;
mod reporter;
mod state;
mod tracker;

pub use context::ModuleContext;
pub use host::ModuleHost;
pub use module::Module;
pub use reporter::ModuleRef;
pub use state::ModuleState;
pub use tracker::EventTracker;
