//! User-initiated model actions
//!
//! These drive both the loader and the status overlay. Status entries are keyed
//! by model *name* here, while embedding entries use the backend's model id;
//! the two key spaces are kept as the backend reports them.

use super::loader::ModelLoader;
use super::status::{ModelKind, ModelState, StatusTracker, StatusUpdate};

pub const LOAD_FAILED_MESSAGE: &str = "Failed to load model";

/// Load `name` on behalf of the user, reflecting progress in the status overlay
pub async fn select_model(loader: &ModelLoader, tracker: &StatusTracker, name: &str) -> bool {
    tracker.set_status(
        name,
        StatusUpdate::state(ModelState::Loading).with_kind(ModelKind::Chat),
    );

    let loaded = loader.load(name).await;
    if loaded {
        tracker.set_status(name, StatusUpdate::state(ModelState::Loaded));
    } else {
        tracker.set_error(name, LOAD_FAILED_MESSAGE);
    }
    loaded
}
