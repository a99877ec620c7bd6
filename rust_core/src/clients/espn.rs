//! ESPN public scoreboard as a keyless stats source.
//!
//! The scoreboard lists every event of a league; the configured game id picks
//! one. ESPN exposes no play feed on this endpoint, so the situation's
//! `lastPlay` (when present) becomes the single recent play.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{http_client, RawGameStats, RawPlay, StatsSource};
use crate::analysis::format_clock;
use crate::error::{CommentaryError, Result};
use crate::models::Sport;

const SERVICE: &str = "espn";
const DEFAULT_BASE_URL: &str = "http://site.api.espn.com/apis/site/v2/sports";

#[derive(Clone)]
pub struct EspnScoreboardClient {
    client: Client,
    sport: Sport,
    base_url: String,
}

impl std::fmt::Debug for EspnScoreboardClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EspnScoreboardClient")
            .field("sport", &self.sport)
            .finish()
    }
}

impl EspnScoreboardClient {
    pub fn new(sport: Sport) -> Self {
        Self::with_client(http_client(Duration::from_secs(10)), sport)
    }

    pub fn with_client(client: Client, sport: Sport) -> Self {
        Self {
            client,
            sport,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn scoreboard_url(&self) -> String {
        let (sport, league) = self.sport.espn_path();
        format!("{}/{}/{}/scoreboard", self.base_url, sport, league)
    }
}

/// Parse clock string like "12:34", "5:00" or "45.2" into whole seconds
fn parse_display_clock(clock: &str) -> Option<u32> {
    let seconds = |s: &str| {
        s.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
    };
    match clock.split(':').collect::<Vec<_>>().as_slice() {
        [mins, secs] => {
            let mins = mins.trim().parse::<u32>().ok()?;
            let secs = seconds(*secs).filter(|s| *s < 60.0)? as u32;
            mins.checked_mul(60)?.checked_add(secs)
        }
        [secs] => {
            let secs = seconds(*secs)?;
            (secs <= u32::MAX as f64).then_some(secs as u32)
        }
        _ => None,
    }
}

/// Whether an ESPN status name means the game is being played
fn is_live_status(name: &str) -> bool {
    let name = name.to_lowercase();
    ["in_progress", "halftime", "end_period"]
        .iter()
        .any(|s| name.contains(s))
}

/// Ids of the scoreboard events currently in progress
pub(crate) fn parse_live_events(data: &Value) -> Result<Vec<String>> {
    let events = data["events"]
        .as_array()
        .ok_or_else(|| CommentaryError::malformed(SERVICE, "scoreboard has no events array"))?;
    Ok(events
        .iter()
        .filter(|e| {
            e["status"]["type"]["name"]
                .as_str()
                .is_some_and(is_live_status)
        })
        .filter_map(|e| e["id"].as_str().map(String::from))
        .collect())
}

/// Extract one event from a scoreboard payload
pub(crate) fn parse_scoreboard_event(data: &Value, game_id: &str) -> Result<RawGameStats> {
    let events = data["events"]
        .as_array()
        .ok_or_else(|| CommentaryError::malformed(SERVICE, "scoreboard has no events array"))?;

    let event = events
        .iter()
        .find(|e| e["id"].as_str() == Some(game_id))
        .ok_or_else(|| {
            CommentaryError::malformed(SERVICE, format!("event {game_id} not on scoreboard"))
        })?;

    let competition = &event["competitions"][0];
    let situation = &competition["situation"];
    let status = &event["status"];

    // `event.date` is the scheduled start, not a reading time, so no timestamp
    let mut stats = RawGameStats {
        game_id: game_id.to_string(),
        ..Default::default()
    };

    let possession_id = situation["possession"].as_str();
    if let Some(competitors) = competition["competitors"].as_array() {
        for comp in competitors {
            let team = &comp["team"];
            let name = team["displayName"].as_str().unwrap_or_default().to_string();
            let score = comp["score"].as_str().and_then(|s| s.parse::<i64>().ok());
            let has_possession = comp["possession"].as_bool().unwrap_or(false)
                || (possession_id.is_some() && team["id"].as_str() == possession_id);

            if has_possession {
                stats.possession = Some(name.clone());
            }
            if comp["homeAway"].as_str() == Some("home") {
                stats.home_team = name;
                stats.home_score = score;
            } else {
                stats.away_team = name;
                stats.away_score = score;
            }
        }
    }

    stats.period = status["period"].as_i64();
    let display_clock = status["displayClock"].as_str().unwrap_or_default();
    let clock = parse_display_clock(display_clock).ok_or_else(|| {
        CommentaryError::malformed(SERVICE, format!("invalid display clock {display_clock:?}"))
    })?;
    stats.game_time = format_clock(clock);

    if let Some(text) = situation["lastPlay"]["text"].as_str() {
        let kind = situation["lastPlay"]["type"]["text"]
            .as_str()
            .unwrap_or("other")
            .to_string();
        let team_id = situation["lastPlay"]["team"]["id"].as_str();
        let team = competition["competitors"].as_array().and_then(|comps| {
            comps
                .iter()
                .find(|c| team_id.is_some() && c["team"]["id"].as_str() == team_id)
                .and_then(|c| c["team"]["displayName"].as_str())
                .map(String::from)
        });
        stats.recent_plays.push(RawPlay {
            sequence: situation["lastPlay"]["id"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            kind,
            description: text.to_string(),
            team,
            time_remaining: Some(clock),
        });
    }

    Ok(stats)
}

impl EspnScoreboardClient {
    async fn scoreboard(&self) -> Result<Value> {
        let resp = self
            .client
            .get(self.scoreboard_url())
            .send()
            .await
            .map_err(|e| CommentaryError::upstream(SERVICE, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CommentaryError::upstream(
                SERVICE,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        resp.json()
            .await
            .map_err(|e| CommentaryError::malformed(SERVICE, e))
    }
}

#[async_trait]
impl StatsSource for EspnScoreboardClient {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, game_id: &str) -> Result<RawGameStats> {
        let data = self.scoreboard().await?;
        parse_scoreboard_event(&data, game_id)
    }

    #[tracing::instrument(skip(self))]
    async fn live_games(&self) -> Result<Vec<String>> {
        let data = self.scoreboard().await?;
        parse_live_events(&data)
    }

    fn source_name(&self) -> &'static str {
        SERVICE
    }
}
