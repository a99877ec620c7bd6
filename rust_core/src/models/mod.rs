// Shared models for the commentary pipeline
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Sport
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sport {
    NBA,
    NCAAB,
    NFL,
    NCAAF,
    NHL,
    MLB,
    MLS,
    #[serde(rename = "SOCCER")]
    Soccer,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::NBA => "NBA",
            Sport::NCAAB => "NCAAB",
            Sport::NFL => "NFL",
            Sport::NCAAF => "NCAAF",
            Sport::NHL => "NHL",
            Sport::MLB => "MLB",
            Sport::MLS => "MLS",
            Sport::Soccer => "SOCCER",
        }
    }

    /// Total game duration in seconds (regulation time)
    pub fn total_seconds(&self) -> u32 {
        match self {
            Sport::NFL | Sport::NCAAF => 3600,
            Sport::NBA => 2880,
            Sport::NCAAB => 2400,
            Sport::NHL => 3600,
            Sport::MLB => 32400, // ~9 innings (estimate)
            Sport::MLS | Sport::Soccer => 5400,
        }
    }

    /// Number of regulation periods (quarters, halves, periods, innings)
    pub fn regulation_periods(&self) -> u8 {
        match self {
            Sport::NFL | Sport::NCAAF | Sport::NBA => 4,
            Sport::NHL => 3,
            Sport::NCAAB | Sport::MLS | Sport::Soccer => 2,
            Sport::MLB => 9,
        }
    }

    /// Regulation length of a single period in seconds
    pub fn period_seconds(&self) -> u32 {
        self.total_seconds() / self.regulation_periods() as u32
    }

    pub fn is_overtime(&self, period: u8) -> bool {
        period > self.regulation_periods()
    }

    /// (sport, league) path segments of the ESPN scoreboard API
    pub fn espn_path(&self) -> (&'static str, &'static str) {
        match self {
            Sport::NFL => ("football", "nfl"),
            Sport::NCAAF => ("football", "college-football"),
            Sport::NBA => ("basketball", "nba"),
            Sport::NCAAB => ("basketball", "mens-college-basketball"),
            Sport::NHL => ("hockey", "nhl"),
            Sport::MLB => ("baseball", "mlb"),
            Sport::MLS => ("soccer", "usa.1"),
            Sport::Soccer => ("soccer", "eng.1"),
        }
    }
}

impl FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nfl" => Ok(Sport::NFL),
            "ncaaf" => Ok(Sport::NCAAF),
            "nba" => Ok(Sport::NBA),
            "ncaab" => Ok(Sport::NCAAB),
            "nhl" => Ok(Sport::NHL),
            "mlb" => Ok(Sport::MLB),
            "mls" => Ok(Sport::MLS),
            "soccer" => Ok(Sport::Soccer),
            other => Err(format!("unsupported sport: {other}")),
        }
    }
}

// ============================================================================
// Play events & momentum
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayKind {
    Score,
    PossessionChange,
    Timeout,
    Injury,
    Penalty,
    Other,
}

impl PlayKind {
    /// Map a provider's free-form play type onto a known kind
    pub fn from_raw(raw: &str) -> Self {
        let raw = raw.to_lowercase();
        if raw.contains("score")
            || raw.contains("goal")
            || raw.contains("touchdown")
            || raw.contains("basket")
            || raw.contains("home_run")
        {
            PlayKind::Score
        } else if raw.contains("possession") || raw.contains("turnover") {
            PlayKind::PossessionChange
        } else if raw.contains("timeout") {
            PlayKind::Timeout
        } else if raw.contains("injury") {
            PlayKind::Injury
        } else if raw.contains("penalty") || raw.contains("foul") {
            PlayKind::Penalty
        } else {
            PlayKind::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayEvent {
    pub sequence: u64,
    pub kind: PlayKind,
    pub description: String,
    /// Team credited with the play, as reported by the provider
    pub team: Option<String>,
    /// Game-clock seconds remaining when the play happened
    pub time_remaining_seconds: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumTrend {
    RisingHome,
    RisingAway,
    Steady,
}

/// Share of the game's momentum held by each side. Always sums to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Momentum {
    pub home: f64,
    pub away: f64,
}

impl Momentum {
    /// Indicator magnitude below which the game is considered steady
    pub const STEADY_BAND: f64 = 0.1;

    pub fn neutral() -> Self {
        Self {
            home: 0.5,
            away: 0.5,
        }
    }

    /// Normalize raw weights so both shares sum to 1.0 (rounded to 2 decimals)
    pub fn normalized(home: f64, away: f64) -> Self {
        let home = home.max(0.0);
        let away = away.max(0.0);
        let total = home + away;
        if total <= f64::EPSILON {
            return Self::neutral();
        }
        let home = (home / total * 100.0).round() / 100.0;
        Self {
            home,
            away: ((1.0 - home) * 100.0).round() / 100.0,
        }
    }

    /// `home - away`, in [-1.0, 1.0]. Positive favours the home side.
    pub fn indicator(&self) -> f64 {
        self.home - self.away
    }

    pub fn trend(&self) -> MomentumTrend {
        let indicator = self.indicator();
        if indicator >= Self::STEADY_BAND {
            MomentumTrend::RisingHome
        } else if indicator <= -Self::STEADY_BAND {
            MomentumTrend::RisingAway
        } else {
            MomentumTrend::Steady
        }
    }
}

/// One side's rates for the game so far, each in [0.0, 1.0]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TeamPerformance {
    /// Successful attempts over attempts
    pub efficiency: f64,
    pub pressure: f64,
    pub defense: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub home: TeamPerformance,
    pub away: TeamPerformance,
}

// ============================================================================
// Snapshot
// ============================================================================

/// One polled game-state reading. Shared behind an `Arc` once created and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub game_id: String,
    /// Per-game poll sequence number, starting at 1
    pub tick: u64,
    pub sport: Sport,
    pub home_team: String,
    pub away_team: String,
    pub home_score: u16,
    pub away_score: u16,
    pub period: u8,
    pub time_remaining_seconds: u32,
    pub possession: Option<String>,
    pub recent_plays: Vec<PlayEvent>,
    pub momentum: Momentum,
    /// Team rates, when the provider reports them
    pub performance: Option<PerformanceMetrics>,
    /// Reading time stamped by the provider
    pub reported_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
}

impl GameSnapshot {
    pub fn score_margin(&self) -> u16 {
        self.home_score.abs_diff(self.away_score)
    }

    /// Leading team name, `None` when tied
    pub fn leader(&self) -> Option<&str> {
        match self.home_score.cmp(&self.away_score) {
            std::cmp::Ordering::Greater => Some(&self.home_team),
            std::cmp::Ordering::Less => Some(&self.away_team),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Team momentum currently favours, `None` when steady
    pub fn momentum_team(&self) -> Option<&str> {
        match self.momentum.trend() {
            MomentumTrend::RisingHome => Some(&self.home_team),
            MomentumTrend::RisingAway => Some(&self.away_team),
            MomentumTrend::Steady => None,
        }
    }

    pub fn clock(&self) -> String {
        crate::analysis::format_clock(self.time_remaining_seconds)
    }

    pub fn is_overtime(&self) -> bool {
        self.sport.is_overtime(self.period)
    }

    pub fn score_line(&self) -> String {
        format!(
            "{} {} - {} {}",
            self.home_team, self.home_score, self.away_score, self.away_team
        )
    }
}

// ============================================================================
// Commentary
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentaryStyle {
    Excited,
    Neutral,
    Analytical,
}

impl CommentaryStyle {
    pub const ALL: [CommentaryStyle; 3] = [
        CommentaryStyle::Excited,
        CommentaryStyle::Neutral,
        CommentaryStyle::Analytical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommentaryStyle::Excited => "excited",
            CommentaryStyle::Neutral => "neutral",
            CommentaryStyle::Analytical => "analytical",
        }
    }

    /// Instruction appended to the generation prompt
    pub fn directive(&self) -> &'static str {
        match self {
            CommentaryStyle::Excited => {
                "Give energetic, enthusiastic play-by-play commentary on this moment."
            }
            CommentaryStyle::Neutral => {
                "Give balanced, objective commentary on the current situation."
            }
            CommentaryStyle::Analytical => {
                "Analyze the strategic implications of the current game situation."
            }
        }
    }
}

impl fmt::Display for CommentaryStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommentaryStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "excited" => Ok(CommentaryStyle::Excited),
            "neutral" => Ok(CommentaryStyle::Neutral),
            "analytical" => Ok(CommentaryStyle::Analytical),
            other => Err(format!("unknown commentary style: {other}")),
        }
    }
}

/// One generated utterance, carrying the snapshot it was derived from.
#[derive(Debug, Clone)]
pub struct CommentaryLine {
    pub snapshot: Arc<GameSnapshot>,
    pub style: CommentaryStyle,
    pub text: String,
    /// True when the text came from a template instead of the generation API
    pub is_fallback: bool,
    pub generated_at: DateTime<Utc>,
}

impl CommentaryLine {
    pub fn new(snapshot: Arc<GameSnapshot>, style: CommentaryStyle, text: String) -> Self {
        Self {
            snapshot,
            style,
            text,
            is_fallback: false,
            generated_at: Utc::now(),
        }
    }

    pub fn fallback(snapshot: Arc<GameSnapshot>, style: CommentaryStyle, text: String) -> Self {
        Self {
            is_fallback: true,
            ..Self::new(snapshot, style, text)
        }
    }

    pub fn game_id(&self) -> &str {
        &self.snapshot.game_id
    }

    pub fn tick(&self) -> u64 {
        self.snapshot.tick
    }
}

// ============================================================================
// Audio
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }
}

/// Rendered speech for exactly one commentary line (matched by game id + tick).
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub game_id: String,
    pub tick: u64,
    pub style: CommentaryStyle,
    pub voice_name: String,
    pub format: AudioFormat,
    pub bytes: Vec<u8>,
}

impl AudioClip {
    pub fn belongs_to(&self, line: &CommentaryLine) -> bool {
        self.game_id == line.game_id() && self.tick == line.tick()
    }
}
