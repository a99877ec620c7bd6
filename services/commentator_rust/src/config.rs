//! Configuration for the commentator service, read from the environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use commentary_core::retry::RetryPolicy;
use commentary_core::sink::colliding_game_ids;
use commentary_core::style::StyleThresholds;
use commentary_core::synthesizer::VoiceProfiles;
use commentary_core::{CommentaryStyle, Sport};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsProvider {
    /// Keyed REST sports-data service
    SportsData,
    /// Public ESPN scoreboard
    Espn,
}

impl FromStr for StatsProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sportsdata" | "sports-data" => Ok(StatsProvider::SportsData),
            "espn" => Ok(StatsProvider::Espn),
            other => Err(format!("unknown stats provider: {other}")),
        }
    }
}

/// Shortest accepted API key
const MIN_API_KEY_LEN: usize = 32;

const AZURE_REGIONS: [&str; 8] = [
    "eastus",
    "eastus2",
    "westus",
    "westus2",
    "northeurope",
    "westeurope",
    "southeastasia",
    "eastasia",
];

#[derive(Debug, Clone)]
pub struct CommentatorConfig {
    // Games (empty: follow whatever the provider lists as live)
    pub game_ids: Vec<String>,
    pub sport: Sport,

    // Upstream services
    pub stats_provider: StatsProvider,
    pub stats_api_key: Option<String>,
    pub stats_base_url: Option<String>,
    pub groq_api_key: String,
    pub groq_base_url: Option<String>,
    pub groq_model: Option<String>,
    pub azure_speech_key: String,
    pub azure_speech_region: String,

    // Pacing & resilience
    pub update_interval: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub inflight_depth: usize,
    pub generation_timeout: Duration,
    pub synthesis_timeout: Duration,

    // Commentary
    pub momentum_threshold: f64,
    pub voice_profiles: VoiceProfiles,

    // Output
    pub output_dir: PathBuf,
    pub artifact_max_age: Option<Duration>,

    pub log_level: String,
}

struct Source<F> {
    lookup: F,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty, trimmed value
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
            None => Ok(default),
        }
    }

    fn api_key(&self, key: &'static str) -> Result<String, ConfigError> {
        let value = self.required(key)?;
        check_api_key(key, &value)?;
        Ok(value)
    }

    fn positive_u64(&self, key: &'static str, default: u64) -> Result<u64, ConfigError> {
        let value = self.parse(key, default)?;
        if value == 0 {
            return Err(ConfigError::Invalid {
                key,
                value: value.to_string(),
                reason: "must be > 0".into(),
            });
        }
        Ok(value)
    }
}

fn check_api_key(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.chars().count() < MIN_API_KEY_LEN || value.chars().any(char::is_whitespace) {
        return Err(ConfigError::Invalid {
            key,
            value: format!("{}...", value.chars().take(4).collect::<String>()),
            reason: format!("expected at least {MIN_API_KEY_LEN} characters without spaces"),
        });
    }
    Ok(())
}

/// Reject id lists where two games would write to the same artifact files
pub fn check_game_ids(game_ids: &[String]) -> Result<(), ConfigError> {
    match colliding_game_ids(game_ids) {
        Some((first, second)) => Err(ConfigError::Invalid {
            key: "GAME_IDS",
            value: game_ids.join(","),
            reason: format!("{first:?} and {second:?} map to the same output files"),
        }),
        None => Ok(()),
    }
}

const VOICE_KEYS: [(CommentaryStyle, &str, &str, &str); 3] = [
    (
        CommentaryStyle::Excited,
        "VOICE_EXCITED_NAME",
        "VOICE_EXCITED_RATE",
        "VOICE_EXCITED_PITCH",
    ),
    (
        CommentaryStyle::Neutral,
        "VOICE_NEUTRAL_NAME",
        "VOICE_NEUTRAL_RATE",
        "VOICE_NEUTRAL_PITCH",
    ),
    (
        CommentaryStyle::Analytical,
        "VOICE_ANALYTICAL_NAME",
        "VOICE_ANALYTICAL_RATE",
        "VOICE_ANALYTICAL_PITCH",
    ),
];

impl CommentatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup (the process environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let src = Source { lookup };

        let game_ids: Vec<String> = src
            .get("GAME_IDS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        check_game_ids(&game_ids)?;

        let sport: Sport = src.parse("SPORT", Sport::NFL)?;
        let stats_provider: StatsProvider = src.parse("STATS_PROVIDER", StatsProvider::SportsData)?;
        let stats_api_key = match stats_provider {
            StatsProvider::SportsData => Some(src.api_key("GAME_STATS_API_KEY")?),
            StatsProvider::Espn => src.get("GAME_STATS_API_KEY"),
        };

        let azure_speech_region = src.required("AZURE_SPEECH_REGION")?.to_lowercase();
        if !AZURE_REGIONS.contains(&azure_speech_region.as_str()) {
            return Err(ConfigError::Invalid {
                key: "AZURE_SPEECH_REGION",
                value: azure_speech_region,
                reason: format!("expected one of {}", AZURE_REGIONS.join(", ")),
            });
        }

        let backoff_base = Duration::from_millis(src.positive_u64("BACKOFF_BASE_MS", 1000)?);
        let backoff_cap = Duration::from_secs(src.positive_u64("BACKOFF_CAP_SECS", 60)?);
        if backoff_cap < backoff_base {
            return Err(ConfigError::Invalid {
                key: "BACKOFF_CAP_SECS",
                value: backoff_cap.as_secs().to_string(),
                reason: "must be >= BACKOFF_BASE_MS".into(),
            });
        }

        let momentum_threshold: f64 = src.parse("MOMENTUM_THRESHOLD", 0.3)?;
        if !(0.0..=1.0).contains(&momentum_threshold) || momentum_threshold == 0.0 {
            return Err(ConfigError::Invalid {
                key: "MOMENTUM_THRESHOLD",
                value: momentum_threshold.to_string(),
                reason: "must be in (0, 1]".into(),
            });
        }

        let mut voice_profiles = VoiceProfiles::default();
        for (style, name_key, rate_key, pitch_key) in VOICE_KEYS {
            let name = src.get(name_key);
            let rate = src.get(rate_key).map(|_| src.parse(rate_key, 1.0f32)).transpose()?;
            let pitch = src.get(pitch_key).map(|_| src.parse(pitch_key, 0i32)).transpose()?;
            voice_profiles
                .update_profile(style, name.as_deref(), rate, pitch)
                .map_err(|e| ConfigError::Invalid {
                    key: name_key,
                    value: name.clone().unwrap_or_default(),
                    reason: e.to_string(),
                })?;
        }

        let artifact_max_age = src
            .get("ARTIFACT_MAX_AGE_HOURS")
            .map(|_| src.positive_u64("ARTIFACT_MAX_AGE_HOURS", 24))
            .transpose()?
            .map(|hours| Duration::from_secs(hours * 3600));

        Ok(Self {
            game_ids,
            sport,
            stats_provider,
            stats_api_key,
            stats_base_url: src.get("GAME_STATS_BASE_URL"),
            groq_api_key: src.api_key("GROQ_API_KEY")?,
            groq_base_url: src.get("GROQ_BASE_URL"),
            groq_model: src.get("GROQ_MODEL"),
            azure_speech_key: src.api_key("AZURE_SPEECH_KEY")?,
            azure_speech_region,
            update_interval: Duration::from_secs(src.positive_u64("UPDATE_INTERVAL", 30)?),
            max_retries: src.parse("MAX_RETRIES", 3u32)?.max(1),
            backoff_base,
            backoff_cap,
            inflight_depth: src.parse("INFLIGHT_DEPTH", 2usize)?.clamp(1, 2),
            generation_timeout: Duration::from_secs(src.positive_u64("GENERATION_TIMEOUT_SECS", 15)?),
            synthesis_timeout: Duration::from_secs(src.positive_u64("SYNTHESIS_TIMEOUT_SECS", 20)?),
            momentum_threshold,
            voice_profiles,
            output_dir: PathBuf::from(src.get("OUTPUT_DIR").unwrap_or_else(|| "output".into())),
            artifact_max_age,
            log_level: src.get("LOG_LEVEL").unwrap_or_else(|| "info".into()),
        })
    }

    /// Per-poll retry policy: `max_retries` attempts, short delays bounded by the backoff cap
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: Duration::from_millis(250).min(self.backoff_base),
            max_delay: Duration::from_secs(5).min(self.backoff_cap),
        }
    }

    pub fn style_thresholds(&self) -> StyleThresholds {
        StyleThresholds {
            momentum_threshold: self.momentum_threshold,
            ..Default::default()
        }
    }
}
