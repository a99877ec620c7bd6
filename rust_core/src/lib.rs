//! Commentary Core - building blocks for live sports commentary.
//!
//! This crate provides:
//! - Game snapshots polled from sports-data providers, with momentum analysis
//! - Commentary style selection with hysteresis
//! - Prompt building, LLM generation and templated fallbacks
//! - Voice profiles and speech synthesis
//! - An output sink for text/audio artifacts and per-game manifests
//! - Retry, backoff and circuit breaking for every upstream call

pub mod analysis;
pub mod circuit_breaker;
pub mod clients;
pub mod error;
pub mod generator;
pub mod models;
pub mod retry;
pub mod sink;
pub mod stats;
pub mod style;
pub mod synthesizer;

pub use circuit_breaker::{CircuitBreaker, BreakerConfig, BreakerState};
pub use error::{CommentaryError, Result};
pub use generator::{CommentaryGenerator, FallbackComposer, GeneratorSettings, PromptBuilder};
pub use models::{
    AudioClip, AudioFormat, CommentaryLine, CommentaryStyle, GameSnapshot, Momentum,
    PerformanceMetrics, PlayEvent, PlayKind, Sport, TeamPerformance,
};
pub use retry::{Backoff, RetryPolicy};
pub use sink::{ArtifactName, OutputSink, PersistedArtifacts};
pub use stats::StatsClient;
pub use style::{StyleSelector, StyleThresholds};
pub use synthesizer::{VoiceProfile, VoiceProfiles, VoiceSynthesizer};
