use std::sync::Arc;

use solace_core::DialogueOrchestrator;

/// Shared application state accessible from all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<DialogueOrchestrator>,
}
