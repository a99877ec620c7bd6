//! Per-game stats polling: fetch, validate, and turn provider data into snapshots.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, warn};

use crate::analysis::{compute_momentum, parse_clock, performance_metrics};
use crate::circuit_breaker::CircuitBreaker;
use crate::clients::{RawGameStats, RawPlay, StatsSource};
use crate::error::{CommentaryError, Result};
use crate::models::{GameSnapshot, PlayEvent, PlayKind, Sport};
use crate::retry::{retry_with_backoff, RetryPolicy};

const SERVICE: &str = "stats";
/// Provider reading timestamps, in UTC
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Polls one game. Owns the tick counter and the score seen on the previous poll.
pub struct StatsClient {
    game_id: String,
    sport: Sport,
    source: Arc<dyn StatsSource>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    tick: u64,
    last_score: Option<(u16, u16)>,
}

impl StatsClient {
    pub fn new(
        game_id: impl Into<String>,
        sport: Sport,
        source: Arc<dyn StatsSource>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            game_id: game_id.into(),
            sport,
            source,
            breaker: CircuitBreaker::with_defaults(SERVICE),
            retry,
            tick: 0,
            last_score: None,
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    /// Sequence number of the most recent poll (0 before the first one)
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Fetch one reading. The tick advances even when the poll fails, so
    /// missed ticks leave a gap instead of being replayed.
    #[tracing::instrument(skip(self), fields(game_id = %self.game_id, tick = self.tick + 1))]
    pub async fn poll(&mut self) -> Result<GameSnapshot> {
        self.tick += 1;
        let tick = self.tick;

        let source = &self.source;
        let breaker = &self.breaker;
        let game_id = self.game_id.as_str();
        let raw = retry_with_backoff(
            move || breaker.call(source.fetch(game_id)),
            &self.retry,
            source.source_name(),
        )
        .await?;

        let snapshot = build_snapshot(raw, &self.game_id, tick, self.sport, self.last_score)
            .inspect_err(|e| warn!(error = %e, "rejected stats payload"))?;
        self.last_score = Some((snapshot.home_score, snapshot.away_score));
        if let Some(sequence) = snapshot.recent_plays.iter().map(|p| p.sequence).max() {
            self.source.commit_plays(&self.game_id, sequence);
        }

        debug!(
            score = %snapshot.score_line(),
            clock = %snapshot.clock(),
            momentum = snapshot.momentum.indicator(),
            "snapshot"
        );
        Ok(snapshot)
    }
}

fn require_text(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CommentaryError::malformed(SERVICE, format!("missing {field}")));
    }
    Ok(())
}

fn score(value: Option<i64>, field: &str) -> Result<u16> {
    let value =
        value.ok_or_else(|| CommentaryError::malformed(SERVICE, format!("missing {field}")))?;
    u16::try_from(value)
        .map_err(|_| CommentaryError::malformed(SERVICE, format!("{field} out of range: {value}")))
}

fn reported_at(timestamp: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    let Some(timestamp) = timestamp.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .map(|naive| Some(Utc.from_utc_datetime(&naive)))
        .map_err(|_| {
            CommentaryError::malformed(
                SERVICE,
                format!("invalid timestamp {timestamp:?}, expected YYYY-MM-DD HH:MM:SS"),
            )
        })
}

fn play_event(raw: RawPlay) -> PlayEvent {
    PlayEvent {
        sequence: raw.sequence,
        kind: PlayKind::from_raw(&raw.kind),
        description: raw.description,
        team: raw.team.filter(|t| !t.trim().is_empty()),
        time_remaining_seconds: raw.time_remaining,
    }
}

/// Validate a provider reading and build the immutable snapshot for `tick`.
pub fn build_snapshot(
    raw: RawGameStats,
    game_id: &str,
    tick: u64,
    sport: Sport,
    previous_score: Option<(u16, u16)>,
) -> Result<GameSnapshot> {
    if !raw.game_id.is_empty() && raw.game_id != game_id {
        return Err(CommentaryError::malformed(
            SERVICE,
            format!("payload is for game {} not {}", raw.game_id, game_id),
        ));
    }
    require_text(&raw.home_team, "home_team")?;
    require_text(&raw.away_team, "away_team")?;

    let home_score = score(raw.home_score, "home_score")?;
    let away_score = score(raw.away_score, "away_score")?;

    let period = raw
        .period
        .ok_or_else(|| CommentaryError::malformed(SERVICE, "missing period"))?;
    let period = u8::try_from(period)
        .map_err(|_| CommentaryError::malformed(SERVICE, format!("period out of range: {period}")))?;

    let time_remaining_seconds = parse_clock(&raw.game_time).ok_or_else(|| {
        CommentaryError::malformed(SERVICE, format!("invalid game clock {:?}", raw.game_time))
    })?;
    let reported_at = reported_at(raw.timestamp.as_deref())?;
    let performance = performance_metrics(raw.home_stats.as_ref(), raw.away_stats.as_ref());

    let recent_plays: Vec<PlayEvent> = raw.recent_plays.into_iter().map(play_event).collect();
    let possession = raw.possession.filter(|p| !p.trim().is_empty());

    let momentum = compute_momentum(
        previous_score,
        home_score,
        away_score,
        &raw.home_team,
        &raw.away_team,
        possession.as_deref(),
        &recent_plays,
    );

    Ok(GameSnapshot {
        game_id: game_id.to_string(),
        tick,
        sport,
        home_team: raw.home_team,
        away_team: raw.away_team,
        home_score,
        away_score,
        period,
        time_remaining_seconds,
        possession,
        recent_plays,
        momentum,
        performance,
        reported_at,
        fetched_at: Utc::now(),
    })
}
