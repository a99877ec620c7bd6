//! Game-state analysis used by snapshot construction and prompt building.
//!
//! This module provides:
//! - Clock parsing and formatting
//! - Momentum computation from score changes, scoring plays and possession
//! - Play importance scoring and key-play selection
//! - Game phase and criticality assessment
//! - Per-team performance rates

use serde::{Deserialize, Serialize};

use crate::clients::RawTeamStats;
use crate::models::{
    GameSnapshot, Momentum, PerformanceMetrics, PlayEvent, PlayKind, Sport, TeamPerformance,
};

/// Momentum bonus per scoring change or scoring play
const SCORING_WEIGHT: f64 = 0.1;
/// Momentum bonus for the team in possession
const POSSESSION_WEIGHT: f64 = 0.05;

/// Parse a strict `MM:SS` clock. Seconds must be below 60.
pub fn parse_clock(clock: &str) -> Option<u32> {
    let (mins, secs) = clock.trim().split_once(':')?;
    if mins.is_empty() || secs.is_empty() {
        return None;
    }
    if !mins.chars().all(|c| c.is_ascii_digit()) || !secs.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mins = mins.parse::<u32>().ok()?;
    let secs = secs.parse::<u32>().ok()?;
    if secs >= 60 {
        return None;
    }
    mins.checked_mul(60)?.checked_add(secs)
}

/// Format seconds as a zero-padded `MM:SS` clock
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn team_matches(candidate: &str, team: &str) -> bool {
    !candidate.is_empty() && candidate.trim().eq_ignore_ascii_case(team.trim())
}

/// Compute the momentum split for a fresh reading.
///
/// The first reading of a game (`previous_score == None`) is always neutral.
pub fn compute_momentum(
    previous_score: Option<(u16, u16)>,
    home_score: u16,
    away_score: u16,
    home_team: &str,
    away_team: &str,
    possession: Option<&str>,
    recent_plays: &[PlayEvent],
) -> Momentum {
    let Some((prev_home, prev_away)) = previous_score else {
        return Momentum::neutral();
    };

    let mut home = 0.5;
    let mut away = 0.5;

    if home_score > prev_home {
        home += SCORING_WEIGHT;
        away -= SCORING_WEIGHT;
    }
    if away_score > prev_away {
        away += SCORING_WEIGHT;
        home -= SCORING_WEIGHT;
    }

    for play in recent_plays.iter().filter(|p| p.kind == PlayKind::Score) {
        match play.team.as_deref() {
            Some(team) if team_matches(team, home_team) => {
                home += SCORING_WEIGHT;
                away -= SCORING_WEIGHT;
            }
            Some(team) if team_matches(team, away_team) => {
                away += SCORING_WEIGHT;
                home -= SCORING_WEIGHT;
            }
            _ => {}
        }
    }

    match possession {
        Some(team) if team_matches(team, home_team) => home += POSSESSION_WEIGHT,
        Some(team) if team_matches(team, away_team) => away += POSSESSION_WEIGHT,
        _ => {}
    }

    Momentum::normalized(home, away)
}

/// Importance of a play in [0.0, 1.0]; plays late in the game weigh more.
pub fn play_importance(play: &PlayEvent) -> f64 {
    let base = match play.kind {
        PlayKind::Score => 0.8,
        PlayKind::Injury => 0.7,
        PlayKind::Penalty => 0.6,
        PlayKind::Timeout => 0.5,
        PlayKind::PossessionChange => 0.4,
        PlayKind::Other => 0.3,
    };

    let scaled = match play.time_remaining_seconds {
        Some(remaining) => {
            let time_factor = (1.5 - remaining as f64 / 3600.0).clamp(0.0, 1.0);
            base * (1.0 + time_factor)
        }
        None => base,
    };

    scaled.min(1.0)
}

/// The `limit` most important plays, most important first (ties keep feed order).
pub fn key_plays(plays: &[PlayEvent], limit: usize) -> Vec<&PlayEvent> {
    let mut ranked: Vec<&PlayEvent> = plays.iter().collect();
    ranked.sort_by(|a, b| play_importance(b).total_cmp(&play_importance(a)));
    ranked.truncate(limit);
    ranked
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Early,
    Middle,
    Late,
    /// Final regulation period with little time left
    Crunch,
    Overtime,
}

impl GamePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GamePhase::Early => "early",
            GamePhase::Middle => "middle",
            GamePhase::Late => "late",
            GamePhase::Crunch => "crunch time",
            GamePhase::Overtime => "overtime",
        }
    }
}

/// Seconds of regulation left in the whole game (0 once in overtime)
pub fn regulation_seconds_left(sport: Sport, period: u8, time_remaining_seconds: u32) -> u32 {
    let periods = sport.regulation_periods();
    if period == 0 || period > periods {
        return 0;
    }
    let later_periods = (periods - period) as u32;
    later_periods * sport.period_seconds() + time_remaining_seconds.min(sport.period_seconds())
}

/// Seconds-left threshold for the crunch phase
pub const CRUNCH_SECONDS: u32 = 300;

pub fn game_phase(sport: Sport, period: u8, time_remaining_seconds: u32) -> GamePhase {
    if sport.is_overtime(period) {
        return GamePhase::Overtime;
    }
    let left = regulation_seconds_left(sport, period, time_remaining_seconds);
    if period == sport.regulation_periods() && time_remaining_seconds <= CRUNCH_SECONDS {
        return GamePhase::Crunch;
    }
    let elapsed_fraction = 1.0 - left as f64 / sport.total_seconds() as f64;
    if elapsed_fraction < 1.0 / 3.0 {
        GamePhase::Early
    } else if elapsed_fraction < 2.0 / 3.0 {
        GamePhase::Middle
    } else {
        GamePhase::Late
    }
}

/// How much the current moment matters, in [0.0, 1.0]: close games late score highest.
pub fn criticality(snapshot: &GameSnapshot) -> f64 {
    let closeness = 1.0 - (snapshot.score_margin().min(20) as f64 / 20.0);
    let lateness = match game_phase(snapshot.sport, snapshot.period, snapshot.time_remaining_seconds) {
        GamePhase::Overtime => 1.0,
        _ => {
            let left = regulation_seconds_left(
                snapshot.sport,
                snapshot.period,
                snapshot.time_remaining_seconds,
            );
            1.0 - left as f64 / snapshot.sport.total_seconds() as f64
        }
    };
    ((closeness * lateness) * 100.0).round() / 100.0
}

/// Full scale of the provider's pressure and defense ratings
const RATING_SCALE: f64 = 100.0;

fn rating(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => (v / RATING_SCALE).clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// Rates for one side. Missing attempts count as one, so no attempts means zero efficiency.
pub fn team_performance(stats: &RawTeamStats) -> TeamPerformance {
    let attempts = stats.attempts.unwrap_or(1.0);
    let successes = stats.successes.unwrap_or(0.0);
    let efficiency = if attempts > 0.0 && successes.is_finite() {
        (successes / attempts).clamp(0.0, 1.0)
    } else {
        0.0
    };
    TeamPerformance {
        efficiency: (efficiency * 1000.0).round() / 1000.0,
        pressure: rating(stats.pressure),
        defense: rating(stats.defense),
    }
}

/// Both sides' rates, or `None` when the provider sent counters for neither.
pub fn performance_metrics(
    home: Option<&RawTeamStats>,
    away: Option<&RawTeamStats>,
) -> Option<PerformanceMetrics> {
    if home.is_none() && away.is_none() {
        return None;
    }
    let empty = RawTeamStats::default();
    Some(PerformanceMetrics {
        home: team_performance(home.unwrap_or(&empty)),
        away: team_performance(away.unwrap_or(&empty)),
    })
}
