//! Per-game commentary loop.
//!
//! Each game runs two tasks joined by a bounded queue:
//! - the front loop polls stats, picks a style and generates a line
//!   (Idle -> Polling -> Generating, or Backoff on failure)
//! - the publisher synthesizes audio and persists artifacts
//!   (Synthesizing -> Persisting -> Idle)
//!
//! The queue lets polling for tick N+1 proceed while tick N is still being
//! voiced, and its depth bounds how far the front loop can run ahead.
//! On shutdown the front loop stops at its next wait and the publisher drains
//! whatever is already queued.

use std::sync::Arc;
use std::time::Duration;

use commentary_core::generator::FallbackComposer;
use commentary_core::synthesizer::SynthesisStatsSnapshot;
use commentary_core::{
    Backoff, CommentaryError, CommentaryGenerator, CommentaryLine, CommentaryStyle, GameSnapshot,
    OutputSink, StatsClient, StyleSelector, VoiceSynthesizer,
};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::state::PipelineState;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub poll_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Lines allowed to wait for the publisher (clamped to 1..=2)
    pub inflight_depth: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(60),
            inflight_depth: 2,
        }
    }
}

/// Everything one game's pipeline owns. Nothing here is shared across games.
pub struct PipelineComponents {
    pub stats: StatsClient,
    pub selector: StyleSelector,
    pub generator: CommentaryGenerator,
    pub synthesizer: VoiceSynthesizer,
    pub sink: OutputSink,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub game_id: String,
    pub metrics: MetricsSnapshot,
    pub synthesis: Option<SynthesisStatsSnapshot>,
}

pub struct GamePipeline {
    game_id: String,
    components: PipelineComponents,
    settings: PipelineSettings,
    metrics: Arc<PipelineMetrics>,
}

/// Sleep for `delay` unless shutdown is signalled first. Returns true on shutdown.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    if delay.is_zero() {
        return false;
    }

    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                // a dropped sender also means stop
                if changed.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}

struct FrontLoop {
    game_id: String,
    stats: StatsClient,
    selector: StyleSelector,
    generator: CommentaryGenerator,
    fallbacks: FallbackComposer,
    backoff: Backoff,
    poll_interval: Duration,
    metrics: Arc<PipelineMetrics>,
    previous: Option<Arc<GameSnapshot>>,
    previous_style: Option<CommentaryStyle>,
    state: PipelineState,
}

impl FrontLoop {
    fn enter(&mut self, next: PipelineState) {
        if next != self.state {
            debug!(game_id = %self.game_id, tick = self.stats.tick(), from = %self.state, to = %next, "stage");
            self.state = next;
        }
    }

    /// Register a failure and return the wait before the next poll.
    ///
    /// The backoff delay is added on top of the poll interval, so a failing
    /// game is never polled faster than its schedule.
    fn back_off(&mut self, error: &CommentaryError) -> Duration {
        let delay = self
            .backoff
            .next_delay()
            .max(error.retry_after().unwrap_or_default());
        self.metrics.record_backoff(delay);
        info!(
            game_id = %self.game_id,
            tick = self.stats.tick(),
            failures = self.backoff.consecutive_failures(),
            delay_ms = delay.as_millis() as u64,
            "backing off"
        );
        self.poll_interval + delay
    }

    async fn run(mut self, tx: mpsc::Sender<CommentaryLine>, mut shutdown: watch::Receiver<bool>) {
        // first poll goes out immediately
        let mut delay = Duration::ZERO;

        loop {
            if wait_or_shutdown(delay, &mut shutdown).await {
                break;
            }
            delay = self.poll_interval;

            self.enter(PipelineState::Polling);
            let snapshot = match self.stats.poll().await {
                Ok(snapshot) => {
                    self.metrics.record_poll(Ok(()));
                    Arc::new(snapshot)
                }
                Err(e) => {
                    self.metrics.record_poll(Err(&e));
                    warn!(
                        game_id = %self.game_id,
                        tick = self.stats.tick(),
                        stage = %self.state,
                        kind = e.kind(),
                        error = %e,
                        "poll failed"
                    );
                    // hysteresis only confirms against the tick right before
                    self.previous = None;
                    let next = self.state.fail(&e);
                    if next == PipelineState::Backoff {
                        delay = self.back_off(&e);
                    }
                    self.enter(next);
                    continue;
                }
            };

            self.enter(self.state.advance());
            let style =
                self.selector
                    .select(&snapshot, self.previous.as_deref(), self.previous_style);
            self.previous = Some(snapshot.clone());
            self.previous_style = Some(style);

            let (line, failure) = match self.generator.generate(snapshot.clone(), style).await {
                Ok(line) => (line, None),
                Err(e) => {
                    warn!(
                        game_id = %self.game_id,
                        tick = snapshot.tick,
                        stage = %self.state,
                        kind = e.kind(),
                        error = %e,
                        "generation failed, using fallback line"
                    );
                    (self.fallbacks.compose(snapshot, style), Some(e))
                }
            };
            self.metrics.record_line(line.is_fallback);

            // bounded hand-off: waits while the publisher is `inflight_depth` lines behind
            if tx.send(line).await.is_err() {
                error!(game_id = %self.game_id, "publisher stopped, ending pipeline");
                break;
            }

            match failure {
                None => {
                    self.backoff.reset();
                    self.enter(PipelineState::Idle);
                }
                Some(e) => {
                    delay = self.back_off(&e);
                    self.enter(self.state.fail(&e));
                }
            }
        }
    }
}

struct Publisher {
    game_id: String,
    synthesizer: VoiceSynthesizer,
    sink: OutputSink,
    metrics: Arc<PipelineMetrics>,
}

impl Publisher {
    async fn run(self, mut rx: mpsc::Receiver<CommentaryLine>) -> SynthesisStatsSnapshot {
        while let Some(line) = rx.recv().await {
            let mut state = PipelineState::Synthesizing;
            let audio = match self.synthesizer.synthesize(&line).await {
                Ok(clip) => {
                    self.metrics.record_synthesis(true);
                    state = state.advance();
                    Some(clip)
                }
                Err(e) => {
                    self.metrics.record_synthesis(false);
                    warn!(
                        game_id = %self.game_id,
                        tick = line.tick(),
                        stage = %state,
                        kind = e.kind(),
                        error = %e,
                        "persisting text without audio"
                    );
                    state = state.fail(&e);
                    None
                }
            };

            match self.sink.persist(&line, audio.as_ref()).await {
                Ok(artifacts) => {
                    self.metrics.record_persist(true);
                    info!(
                        game_id = %self.game_id,
                        tick = line.tick(),
                        style = %line.style,
                        fallback = line.is_fallback,
                        audio = artifacts.audio_path.is_some(),
                        manifest = artifacts.manifest_written,
                        text = %line.text,
                        "commentary"
                    );
                }
                Err(e) => {
                    self.metrics.record_persist(false);
                    error!(
                        game_id = %self.game_id,
                        tick = line.tick(),
                        stage = %state,
                        kind = e.kind(),
                        error = %e,
                        "failed to persist commentary"
                    );
                }
            }
            // audio bytes are released here, once written
        }
        self.synthesizer.stats()
    }
}

impl GamePipeline {
    pub fn new(components: PipelineComponents, settings: PipelineSettings) -> Self {
        Self {
            game_id: components.stats.game_id().to_string(),
            components,
            settings,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    /// Live counters, readable while `run` is in progress
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.metrics.clone()
    }

    /// Run until `shutdown` turns true (or its sender is dropped), then drain.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> PipelineReport {
        let GamePipeline {
            game_id,
            components,
            settings,
            metrics,
        } = self;

        let depth = settings.inflight_depth.clamp(1, 2);
        let (tx, rx) = mpsc::channel(depth);
        info!(
            game_id = %game_id,
            interval_secs = settings.poll_interval.as_secs(),
            depth,
            "pipeline started"
        );

        let publisher = Publisher {
            game_id: game_id.clone(),
            synthesizer: components.synthesizer,
            sink: components.sink,
            metrics: metrics.clone(),
        };
        let publisher = tokio::spawn(publisher.run(rx));

        let front = FrontLoop {
            game_id: game_id.clone(),
            stats: components.stats,
            selector: components.selector,
            generator: components.generator,
            fallbacks: FallbackComposer::new(),
            backoff: Backoff::new(settings.backoff_base, settings.backoff_cap),
            poll_interval: settings.poll_interval,
            metrics: metrics.clone(),
            previous: None,
            previous_style: None,
            state: PipelineState::Idle,
        };
        // dropping the sender at the end lets the publisher drain and exit
        front.run(tx, shutdown).await;

        let synthesis = match publisher.await {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!(game_id = %game_id, error = %e, "publisher task failed");
                None
            }
        };

        let report = PipelineReport {
            game_id,
            metrics: metrics.snapshot(),
            synthesis,
        };
        info!(
            game_id = %report.game_id,
            polls = report.metrics.polls,
            persisted = report.metrics.artifacts_persisted,
            "pipeline stopped"
        );
        report
    }
}
