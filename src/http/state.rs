use crate::coordinator::SessionCoordinator;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Owner of every session and quota transition
    pub coordinator: SessionCoordinator,

    /// Largest accepted audio upload in bytes
    pub max_audio_bytes: usize,
}

impl AppState {
    pub fn new(coordinator: SessionCoordinator, max_audio_bytes: usize) -> Self {
        Self {
            coordinator,
            max_audio_bytes,
        }
    }
}
