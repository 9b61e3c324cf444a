//! Model lifecycle
//!
//! - `registry`: last discovered model list
//! - `loader`: discover/load orchestration and the current-model pointer
//! - `status`: per-model UI status overlay
//! - `actions`: user-initiated loads that drive loader and status together

pub mod actions;
pub mod loader;
pub mod registry;
pub mod status;

pub use actions::select_model;
pub use loader::{LoadOutcome, ModelLoader};
pub use registry::ModelRegistry;
pub use status::{ModelKind, ModelState, ModelStatus, StatusTracker, StatusUpdate};
