//! Per-game orchestration

pub mod orchestrator;
pub mod state;

pub use orchestrator::{GamePipeline, PipelineComponents, PipelineReport, PipelineSettings};
pub use state::PipelineState;
