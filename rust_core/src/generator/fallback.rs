//! Templated commentary used when the generation API fails

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{CommentaryLine, CommentaryStyle, GameSnapshot};

const EXCITED: &[&str] = &[
    "What a moment! {situation} with {clock} left in period {period}!",
    "The crowd is on its feet! {home} {score} {away} and the clock reads {clock}!",
    "Here we go! {situation}, and anything can happen from here!",
];

const NEUTRAL: &[&str] = &[
    "{situation} with {clock} remaining in period {period}.",
    "We're at {clock} in period {period}. {home} {score} {away}.",
    "The game continues with a score of {score}.",
];

const ANALYTICAL: &[&str] = &[
    "{situation}. With {clock} left in period {period}, both sides will be adjusting their plans.",
    "Looking at the numbers: {home} {score} {away} at {clock} of period {period}.",
    "{situation}. The next few possessions will shape how this one is decided.",
];

fn templates(style: CommentaryStyle) -> &'static [&'static str] {
    match style {
        CommentaryStyle::Excited => EXCITED,
        CommentaryStyle::Neutral => NEUTRAL,
        CommentaryStyle::Analytical => ANALYTICAL,
    }
}

/// Line that is always available, whatever the snapshot holds
pub fn generic_line(snapshot: &GameSnapshot) -> String {
    format!(
        "The game continues with a score of {}-{}.",
        snapshot.home_score, snapshot.away_score
    )
}

fn situation(snapshot: &GameSnapshot) -> String {
    let (high, low) = if snapshot.home_score >= snapshot.away_score {
        (snapshot.home_score, snapshot.away_score)
    } else {
        (snapshot.away_score, snapshot.home_score)
    };
    match snapshot.leader() {
        Some(team) => format!("{team} lead {high}-{low}"),
        None => format!("All square at {high}-{low}"),
    }
}

fn render(template: &str, snapshot: &GameSnapshot) -> String {
    template
        .replace("{situation}", &situation(snapshot))
        .replace("{home}", &snapshot.home_team)
        .replace("{away}", &snapshot.away_team)
        .replace(
            "{score}",
            &format!("{}-{}", snapshot.home_score, snapshot.away_score),
        )
        .replace("{clock}", &snapshot.clock())
        .replace("{period}", &snapshot.period.to_string())
}

/// Rotates through per-style templates so consecutive fallbacks don't repeat.
#[derive(Debug, Default)]
pub struct FallbackComposer {
    next: HashMap<CommentaryStyle, usize>,
}

impl FallbackComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compose_text(&mut self, snapshot: &GameSnapshot, style: CommentaryStyle) -> String {
        let options = templates(style);
        let slot = self.next.entry(style).or_insert(0);
        let index = *slot % options.len();
        *slot = index + 1;

        let text = render(options[index], snapshot);
        if text.trim().is_empty() {
            generic_line(snapshot)
        } else {
            text
        }
    }

    pub fn compose(&mut self, snapshot: Arc<GameSnapshot>, style: CommentaryStyle) -> CommentaryLine {
        let text = self.compose_text(&snapshot, style);
        CommentaryLine::fallback(snapshot, style, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Momentum, Sport};
    use chrono::Utc;

    fn snapshot(home: u16, away: u16) -> GameSnapshot {
        GameSnapshot {
            game_id: "g1".into(),
            tick: 1,
            sport: Sport::NBA,
            home_team: "Celtics".into(),
            away_team: "Heat".into(),
            home_score: home,
            away_score: away,
            period: 3,
            time_remaining_seconds: 421,
            possession: None,
            recent_plays: vec![],
            momentum: Momentum::neutral(),
            performance: None,
            reported_at: None,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_fallback_is_never_empty() {
        let mut composer = FallbackComposer::new();
        let snap = Arc::new(snapshot(88, 91));
        for style in CommentaryStyle::ALL {
            for _ in 0..5 {
                let line = composer.compose(snap.clone(), style);
                assert!(line.is_fallback);
                assert_eq!(line.style, style);
                assert!(!line.text.trim().is_empty());
                assert!(!line.text.contains('{'), "{}", line.text);
            }
        }
    }

    #[test]
    fn test_fallback_rotates() {
        let mut composer = FallbackComposer::new();
        let snap = snapshot(10, 7);
        let first = composer.compose_text(&snap, CommentaryStyle::Neutral);
        let second = composer.compose_text(&snap, CommentaryStyle::Neutral);
        assert_ne!(first, second);
        assert_eq!(composer.compose_text(&snap, CommentaryStyle::Neutral), "The game continues with a score of 10-7.");
        assert_eq!(composer.compose_text(&snap, CommentaryStyle::Neutral), first);
    }

    #[test]
    fn test_situation_phrases() {
        assert_eq!(situation(&snapshot(88, 91)), "Heat lead 91-88");
        assert_eq!(situation(&snapshot(50, 50)), "All square at 50-50");
        assert_eq!(
            render(EXCITED[0], &snapshot(10, 7)),
            "What a moment! Celtics lead 10-7 with 07:01 left in period 3!"
        );
    }
}
