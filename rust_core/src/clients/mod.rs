//! Upstream service clients and the traits the pipeline talks to.
//!
//! Each external collaborator sits behind an async trait so the pipeline can be
//! driven by in-process fakes in tests:
//! - `StatsSource` - sports-data providers (`SportsDataClient`, `EspnScoreboardClient`)
//! - `TextGenerator` - hosted LLM chat completions (`GroqClient`)
//! - `SpeechEngine` - hosted text-to-speech (`AzureSpeechClient`)

pub mod azure_speech;
pub mod espn;
pub mod groq;
pub mod sportsdata;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::AudioFormat;

pub use azure_speech::AzureSpeechClient;
pub use espn::EspnScoreboardClient;
pub use groq::GroqClient;
pub use sportsdata::SportsDataClient;

/// Game statistics as reported by a provider, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawGameStats {
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub home_team: String,
    #[serde(default)]
    pub away_team: String,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub period: Option<i64>,
    #[serde(default)]
    pub game_time: String,
    #[serde(default)]
    pub possession: Option<String>,
    #[serde(default)]
    pub recent_plays: Vec<RawPlay>,
    #[serde(default)]
    pub home_stats: Option<RawTeamStats>,
    #[serde(default)]
    pub away_stats: Option<RawTeamStats>,
}

/// Per-team counters from the provider's team-stats feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTeamStats {
    #[serde(default)]
    pub attempts: Option<f64>,
    #[serde(default)]
    pub successes: Option<f64>,
    /// 0-100 scale
    #[serde(default)]
    pub pressure: Option<f64>,
    /// 0-100 scale
    #[serde(default)]
    pub defense: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPlay {
    #[serde(default)]
    pub sequence: u64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub time_remaining: Option<u32>,
}

/// Source of live game statistics
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn fetch(&self, game_id: &str) -> Result<RawGameStats>;

    /// Ids of the games in progress. Providers without a live listing report none.
    async fn live_games(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// A reading holding plays up to `sequence` was accepted; later fetches may skip them.
    fn commit_plays(&self, _game_id: &str, _sequence: u64) {}

    /// Provider name for logging
    fn source_name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Hosted text-generation API
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub voice_name: String,
    pub ssml: String,
}

/// Hosted speech-synthesis API
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    async fn render(&self, request: &SpeechRequest) -> Result<Vec<u8>>;

    fn output_format(&self) -> AudioFormat;
}

/// Parse an integer-seconds `Retry-After` header
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Build a reqwest client with a per-request timeout
pub fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
