//! REST sports-data provider. All endpoints use bearer auth.
//!
//! - `GET {base}/games/live` lists games in progress
//! - `GET {base}/games/{id}/stats` returns the scoreboard state
//! - `GET {base}/games/{id}/plays?since_sequence=N` returns plays newer than
//!   the last committed one for that game
//! - `GET {base}/games/{id}/team-stats` returns per-team counters

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{http_client, RawGameStats, RawPlay, RawTeamStats, StatsSource};
use crate::error::{CommentaryError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.sportsdataservice.com/v1";
const SERVICE: &str = "sports-data";

pub struct SportsDataClient {
    client: Client,
    api_key: String,
    base_url: String,
    /// game_id -> highest play sequence of an accepted reading
    last_sequence: Mutex<HashMap<String, u64>>,
}

impl std::fmt::Debug for SportsDataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SportsDataClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct PlaysResponse {
    #[serde(default)]
    plays: Vec<RawPlay>,
}

#[derive(Debug, Default, Deserialize)]
struct TeamStatsResponse {
    #[serde(default)]
    home: Option<RawTeamStats>,
    #[serde(default)]
    away: Option<RawTeamStats>,
}

#[derive(Debug, Deserialize)]
struct LiveGame {
    #[serde(alias = "id")]
    game_id: String,
}

#[derive(Debug, Deserialize)]
struct LiveGamesResponse {
    #[serde(default)]
    games: Vec<LiveGame>,
}

impl SportsDataClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_client(http_client(Duration::from_secs(10)), api_key)
    }

    pub fn with_client(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            last_sequence: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| CommentaryError::upstream(SERVICE, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| CommentaryError::upstream(SERVICE, e))?;
        serde_json::from_slice(&bytes).map_err(|e| CommentaryError::malformed(SERVICE, e))
    }

    fn since(&self, game_id: &str) -> u64 {
        self.last_sequence.lock().get(game_id).copied().unwrap_or(0)
    }

    /// Plays after the last committed sequence. Nothing is marked seen here.
    #[tracing::instrument(skip(self))]
    async fn fetch_new_plays(&self, game_id: &str) -> Result<Vec<RawPlay>> {
        let since = self.since(game_id);
        let url = format!("{}/games/{}/plays", self.base_url, game_id);
        let resp: PlaysResponse = self
            .get_json(&url, &[("since_sequence", since.to_string())])
            .await?;

        Ok(resp.plays.into_iter().filter(|p| p.sequence > since).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_team_stats(&self, game_id: &str) -> Result<TeamStatsResponse> {
        let url = format!("{}/games/{}/team-stats", self.base_url, game_id);
        self.get_json(&url, &[]).await
    }
}

/// Map a non-success HTTP status onto the error taxonomy
fn classify_status(status: StatusCode, body: &str) -> CommentaryError {
    let message = format!("HTTP {} {}", status.as_u16(), body.trim());
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        CommentaryError::upstream(SERVICE, message)
    } else {
        // 4xx other than throttling: the request itself is wrong (bad key, unknown game)
        CommentaryError::malformed(SERVICE, message)
    }
}

#[async_trait]
impl StatsSource for SportsDataClient {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, game_id: &str) -> Result<RawGameStats> {
        let url = format!("{}/games/{}/stats", self.base_url, game_id);
        let mut stats: RawGameStats = self.get_json(&url, &[]).await?;

        // Plays and team counters are supplementary: a failure here still yields a usable reading
        match self.fetch_new_plays(game_id).await {
            Ok(plays) if !plays.is_empty() => stats.recent_plays = plays,
            Ok(_) => {}
            Err(e) => tracing::warn!(game_id, error = %e, "play-by-play unavailable"),
        }
        match self.fetch_team_stats(game_id).await {
            Ok(team) => {
                stats.home_stats = team.home.or(stats.home_stats);
                stats.away_stats = team.away.or(stats.away_stats);
            }
            Err(e) => tracing::warn!(game_id, error = %e, "team stats unavailable"),
        }

        Ok(stats)
    }

    #[tracing::instrument(skip(self))]
    async fn live_games(&self) -> Result<Vec<String>> {
        let url = format!("{}/games/live", self.base_url);
        let resp: LiveGamesResponse = self.get_json(&url, &[]).await?;
        Ok(resp
            .games
            .into_iter()
            .map(|g| g.game_id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect())
    }

    fn commit_plays(&self, game_id: &str, sequence: u64) {
        let mut seen = self.last_sequence.lock();
        let entry = seen.entry(game_id.to_string()).or_insert(0);
        *entry = (*entry).max(sequence);
    }

    fn source_name(&self) -> &'static str {
        SERVICE
    }
}
