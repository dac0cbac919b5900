pub mod config;
pub mod error;
pub mod merge;
pub mod orchestrator;
pub mod scripts;
pub mod tier;

pub use config::{GenerationConfig, ModerationConfig, SolaceConfig, UsageConfig};
pub use error::TurnError;
pub use merge::{AnalysisMerger, MergePolicy};
pub use orchestrator::{DialogueOrchestrator, OrchestratorSettings, TurnOutcome, TurnRequest};
pub use tier::{route, RouteSignals};
