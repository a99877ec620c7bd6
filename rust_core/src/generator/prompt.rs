//! Prompt construction for the generation API

use std::fmt::Write;

use crate::analysis::{criticality, game_phase, key_plays};
use crate::models::{CommentaryStyle, GameSnapshot, MomentumTrend, TeamPerformance};

use super::truncate_chars;

pub const SYSTEM_PROMPT: &str = "You are an experienced sports commentator. \
Provide engaging, natural commentary in one or two short sentences. \
Only use the facts you are given.";

pub const DEFAULT_MAX_PROMPT_CHARS: usize = 1200;
const KEY_PLAY_COUNT: usize = 3;

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_prompt_chars: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PROMPT_CHARS)
    }
}

impl PromptBuilder {
    pub fn new(max_prompt_chars: usize) -> Self {
        Self { max_prompt_chars }
    }

    pub fn max_prompt_chars(&self) -> usize {
        self.max_prompt_chars
    }

    fn situation(snapshot: &GameSnapshot) -> String {
        let phase = game_phase(snapshot.sport, snapshot.period, snapshot.time_remaining_seconds);
        let mut out = String::from("Game situation:\n");
        let _ = writeln!(out, "- {} game", snapshot.sport.as_str());
        let _ = writeln!(out, "- Score: {}", snapshot.score_line());
        let _ = writeln!(
            out,
            "- Period {}, {} remaining ({})",
            snapshot.period,
            snapshot.clock(),
            phase.as_str()
        );
        if let Some(team) = &snapshot.possession {
            let _ = writeln!(out, "- Possession: {team}");
        }
        match snapshot.momentum.trend() {
            MomentumTrend::Steady => {
                let _ = writeln!(out, "- Momentum: even");
            }
            _ => {
                if let Some(team) = snapshot.momentum_team() {
                    let _ = writeln!(
                        out,
                        "- Momentum: with {} ({:.2} / {:.2})",
                        team, snapshot.momentum.home, snapshot.momentum.away
                    );
                }
            }
        }
        let _ = writeln!(out, "- Criticality: {:.2}", criticality(snapshot));
        if let Some(perf) = &snapshot.performance {
            let _ = writeln!(
                out,
                "- Performance: {} {}; {} {}",
                snapshot.home_team,
                Self::rates(&perf.home),
                snapshot.away_team,
                Self::rates(&perf.away)
            );
        }
        out
    }

    fn rates(team: &TeamPerformance) -> String {
        format!(
            "efficiency {:.2}, pressure {:.2}, defense {:.2}",
            team.efficiency, team.pressure, team.defense
        )
    }

    /// User prompt for `snapshot`, at most `max_prompt_chars` long.
    ///
    /// The style directive is always kept whole; situation facts come next and
    /// recent plays fill whatever budget remains, most important first.
    pub fn build(&self, snapshot: &GameSnapshot, style: CommentaryStyle) -> String {
        let directive = format!("\nStyle: {}", style.directive());
        let budget = self
            .max_prompt_chars
            .saturating_sub(directive.chars().count());

        let mut body = Self::situation(snapshot);
        let plays = key_plays(&snapshot.recent_plays, KEY_PLAY_COUNT);
        if !plays.is_empty() {
            let heading = "Recent plays:\n";
            if body.chars().count() + heading.len() < budget {
                body.push_str(heading);
                for play in plays {
                    let line = format!("- {}\n", play.description.trim());
                    if body.chars().count() + line.chars().count() > budget {
                        break;
                    }
                    body.push_str(&line);
                }
            }
        }

        let mut prompt = truncate_chars(body.trim_end(), budget).to_string();
        prompt.push_str(&directive);
        truncate_chars(&prompt, self.max_prompt_chars).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Momentum, PerformanceMetrics, PlayEvent, PlayKind, Sport};
    use chrono::Utc;

    fn snapshot(plays: usize) -> GameSnapshot {
        GameSnapshot {
            game_id: "g1".into(),
            tick: 4,
            sport: Sport::NFL,
            home_team: "Hawks".into(),
            away_team: "Bears".into(),
            home_score: 10,
            away_score: 7,
            period: 4,
            time_remaining_seconds: 135,
            possession: Some("Hawks".into()),
            recent_plays: (0..plays)
                .map(|i| PlayEvent {
                    sequence: i as u64,
                    kind: if i == 1 { PlayKind::Score } else { PlayKind::Other },
                    description: format!("play number {i} with a fairly long description"),
                    team: None,
                    time_remaining_seconds: None,
                })
                .collect(),
            momentum: Momentum::normalized(0.7, 0.3),
            performance: None,
            reported_at: None,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_prompt_contains_facts_and_directive() {
        let prompt = PromptBuilder::default().build(&snapshot(2), CommentaryStyle::Excited);
        assert!(prompt.contains("Hawks 10 - 7 Bears"));
        assert!(prompt.contains("02:15 remaining (crunch time)"));
        assert!(prompt.contains("Momentum: with Hawks"));
        assert!(prompt.contains("play number 1"));
        assert!(prompt.ends_with(CommentaryStyle::Excited.directive()));
    }

    #[test]
    fn test_prompt_includes_team_performance() {
        let plain = PromptBuilder::default().build(&snapshot(0), CommentaryStyle::Neutral);
        assert!(!plain.contains("Performance"));

        let mut with_rates = snapshot(0);
        with_rates.performance = Some(PerformanceMetrics {
            home: TeamPerformance {
                efficiency: 0.45,
                pressure: 0.6,
                defense: 0.7,
            },
            away: TeamPerformance::default(),
        });
        let prompt = PromptBuilder::default().build(&with_rates, CommentaryStyle::Neutral);
        assert!(prompt.contains(
            "- Performance: Hawks efficiency 0.45, pressure 0.60, defense 0.70; \
             Bears efficiency 0.00, pressure 0.00, defense 0.00"
        ));
    }

    #[test]
    fn test_prompt_lists_at_most_three_plays() {
        let prompt = PromptBuilder::default().build(&snapshot(10), CommentaryStyle::Neutral);
        assert_eq!(prompt.matches("play number").count(), 3);
        // the scoring play ranks first
        let first = prompt.find("play number 1 ").unwrap();
        let other = prompt.find("play number 0 ").unwrap();
        assert!(first < other);
    }

    #[test]
    fn test_prompt_is_bounded() {
        for max in [80, 200, 400] {
            let builder = PromptBuilder::new(max);
            let prompt = builder.build(&snapshot(10), CommentaryStyle::Analytical);
            assert!(prompt.chars().count() <= max, "{max}: {}", prompt.len());
            assert!(prompt.ends_with(CommentaryStyle::Analytical.directive()));
        }
    }
}
