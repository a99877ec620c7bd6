//! Commentator service: configuration, per-game pipelines and process wiring.

pub mod config;
pub mod metrics;
pub mod pipeline;
pub mod runtime;

pub use config::{CommentatorConfig, ConfigError, StatsProvider};
pub use pipeline::{GamePipeline, PipelineComponents, PipelineReport, PipelineSettings, PipelineState};
