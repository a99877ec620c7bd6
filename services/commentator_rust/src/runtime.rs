//! Wiring from configuration to live pipelines

use std::sync::Arc;
use std::time::Duration;

use commentary_core::clients::{
    http_client, AzureSpeechClient, EspnScoreboardClient, GroqClient, SportsDataClient,
    StatsSource,
};
use commentary_core::generator::GeneratorSettings;
use commentary_core::{
    CommentaryGenerator, OutputSink, StatsClient, StyleSelector, VoiceSynthesizer,
};
use anyhow::{bail, Context};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{check_game_ids, CommentatorConfig, StatsProvider};
use crate::pipeline::{GamePipeline, PipelineComponents, PipelineSettings};

/// Per-request ceiling for plain HTTP calls; generation and synthesis add their own timeouts on top
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub fn stats_source(config: &CommentatorConfig, http: reqwest::Client) -> Arc<dyn StatsSource> {
    match config.stats_provider {
        StatsProvider::SportsData => {
            let mut client =
                SportsDataClient::with_client(http, config.stats_api_key.clone().unwrap_or_default());
            if let Some(url) = &config.stats_base_url {
                client = client.with_base_url(url.clone());
            }
            Arc::new(client)
        }
        StatsProvider::Espn => {
            let mut client = EspnScoreboardClient::with_client(http, config.sport);
            if let Some(url) = &config.stats_base_url {
                client = client.with_base_url(url.clone());
            }
            Arc::new(client)
        }
    }
}

fn groq_client(config: &CommentatorConfig, http: reqwest::Client) -> GroqClient {
    let mut client = GroqClient::with_client(http, config.groq_api_key.clone());
    if let Some(url) = &config.groq_base_url {
        client = client.with_base_url(url.clone());
    }
    if let Some(model) = &config.groq_model {
        client = client.with_model(model.clone());
    }
    client
}

/// Games to follow: the configured ids, or the provider's live listing when none are set
pub async fn resolve_game_ids(
    config: &CommentatorConfig,
    source: &dyn StatsSource,
) -> anyhow::Result<Vec<String>> {
    if !config.game_ids.is_empty() {
        return Ok(config.game_ids.clone());
    }

    let mut game_ids = source
        .live_games()
        .await
        .with_context(|| format!("Failed to list live games from {}", source.source_name()))?;
    game_ids.sort();
    game_ids.dedup();
    check_game_ids(&game_ids)?;
    if game_ids.is_empty() {
        bail!(
            "GAME_IDS is empty and {} reports no live games",
            source.source_name()
        );
    }
    info!(games = ?game_ids, source = source.source_name(), "discovered live games");
    Ok(game_ids)
}

pub fn pipeline_settings(config: &CommentatorConfig) -> PipelineSettings {
    PipelineSettings {
        poll_interval: config.update_interval,
        backoff_base: config.backoff_base,
        backoff_cap: config.backoff_cap,
        inflight_depth: config.inflight_depth,
    }
}

/// Build the pipeline for one game. Clients, breakers and counters are private to it.
pub fn build_pipeline(config: &CommentatorConfig, game_id: &str, sink: OutputSink) -> GamePipeline {
    let http = http_client(HTTP_TIMEOUT);

    let stats = StatsClient::new(
        game_id,
        config.sport,
        stats_source(config, http.clone()),
        config.retry_policy(),
    );
    let generator = CommentaryGenerator::new(
        Arc::new(groq_client(config, http.clone())),
        GeneratorSettings {
            timeout: config.generation_timeout,
            ..Default::default()
        },
    );
    let synthesizer = VoiceSynthesizer::new(
        Arc::new(AzureSpeechClient::with_client(
            http,
            config.azure_speech_key.clone(),
            config.azure_speech_region.clone(),
        )),
        config.voice_profiles.clone(),
        config.synthesis_timeout,
    );

    GamePipeline::new(
        PipelineComponents {
            stats,
            selector: StyleSelector::new(config.style_thresholds()),
            generator,
            synthesizer,
            sink,
        },
        pipeline_settings(config),
    )
}

/// Warn about voice profiles the speech region does not offer
pub async fn check_voices(config: &CommentatorConfig) {
    let client = AzureSpeechClient::with_client(
        http_client(HTTP_TIMEOUT),
        config.azure_speech_key.clone(),
        config.azure_speech_region.clone(),
    );
    match client.list_voices().await {
        Ok(voices) => {
            let missing = config.voice_profiles.unknown_voices(&voices);
            if missing.is_empty() {
                info!(available = voices.len(), "voice profiles verified");
            }
            for (style, voice) in missing {
                warn!(style = %style, voice = %voice, "voice not offered in region, audio for this style will fail");
            }
        }
        Err(e) => warn!(error = %e, "could not list voices, skipping check"),
    }
}

/// Periodically remove artifacts older than `max_age` until shutdown
pub async fn run_janitor(sink: OutputSink, max_age: Duration, mut shutdown: watch::Receiver<bool>) {
    let period = (max_age / 4).clamp(Duration::from_secs(60), Duration::from_secs(3600));
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sink.prune_older_than(max_age).await {
                    warn!(error = %e, "artifact pruning failed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use commentary_core::clients::RawGameStats;
    use commentary_core::{CommentaryError, Result};
    use std::collections::HashMap;

    struct Listing(Vec<&'static str>);

    #[async_trait]
    impl StatsSource for Listing {
        async fn fetch(&self, _game_id: &str) -> Result<RawGameStats> {
            Err(CommentaryError::upstream("listing", "no stats"))
        }

        async fn live_games(&self) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }

        fn source_name(&self) -> &'static str {
            "listing"
        }
    }

    fn config() -> CommentatorConfig {
        config_with_games("g1,g2")
    }

    fn config_with_games(game_ids: &'static str) -> CommentatorConfig {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GAME_IDS", game_ids),
            ("STATS_PROVIDER", "espn"),
            ("SPORT", "nhl"),
            ("GROQ_API_KEY", "gsk_0123456789abcdef0123456789abcdef"),
            ("AZURE_SPEECH_KEY", "0123456789abcdef0123456789abcdef"),
            ("AZURE_SPEECH_REGION", "westus"),
            ("UPDATE_INTERVAL", "10"),
            ("INFLIGHT_DEPTH", "1"),
        ]);
        CommentatorConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap()
    }

    #[test]
    fn test_pipeline_settings_from_config() {
        let settings = pipeline_settings(&config());
        assert_eq!(settings.poll_interval, Duration::from_secs(10));
        assert_eq!(settings.inflight_depth, 1);
        assert_eq!(settings.backoff_cap, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_build_pipeline_per_game() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::open(dir.path()).await.unwrap();
        let config = config();

        let pipelines: Vec<GamePipeline> = config
            .game_ids
            .iter()
            .map(|id| build_pipeline(&config, id, sink.clone()))
            .collect();
        assert_eq!(pipelines[0].game_id(), "g1");
        assert_eq!(pipelines[1].game_id(), "g2");
        assert!(!Arc::ptr_eq(&pipelines[0].metrics(), &pipelines[1].metrics()));
    }

    #[tokio::test]
    async fn test_configured_ids_skip_discovery() {
        let ids = resolve_game_ids(&config(), &Listing(vec!["other"])).await.unwrap();
        assert_eq!(ids, vec!["g1", "g2"]);
    }

    #[tokio::test]
    async fn test_discovers_live_games() {
        let config = config_with_games("");
        let ids = resolve_game_ids(&config, &Listing(vec!["402", "401", "402"]))
            .await
            .unwrap();
        assert_eq!(ids, vec!["401", "402"]);

        assert!(resolve_game_ids(&config, &Listing(vec![])).await.is_err());
        assert!(resolve_game_ids(&config, &Listing(vec!["nba_1", "nba-1"]))
            .await
            .is_err());
    }
}
