//! Model-serving backend boundary
//!
//! The client never runs inference. Everything it knows about models comes
//! through [`ModelBackend`]:
//! - `sidecar`: the real backend process, over JSON-RPC on stdio
//! - `timed`: per-operation deadlines around any backend
//! - `fake` (tests only): scripted in-memory backend

pub mod provider;
pub mod rpc;
pub mod sidecar;
pub mod timed;
pub mod types;

#[cfg(test)]
pub mod fake;

pub use provider::{ops, BackendError, ModelBackend};
pub use rpc::{Notification, RpcChannel};
pub use sidecar::SidecarBackend;
pub use timed::{CallTimeouts, TimedBackend};
pub use types::{Model, ModelInfo};
