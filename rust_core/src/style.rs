//! Commentary tone selection with hysteresis.
//!
//! A snapshot classifies to a style on its own (`classify`). `select` only
//! switches away from the previous style once two consecutive snapshots agree
//! on the new one, so a single noisy momentum reading cannot flip the tone.

use crate::models::{CommentaryStyle, GameSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub struct StyleThresholds {
    /// |momentum indicator| at or above which play is exciting
    pub momentum_threshold: f64,
    /// |momentum indicator| below which the game counts as calm
    pub calm_threshold: f64,
    /// Seconds left in the final period that count as clutch time
    pub clutch_seconds: u32,
    /// Largest margin still considered a close game
    pub close_margin: u16,
    /// Smallest margin considered a blowout
    pub blowout_margin: u16,
}

impl Default for StyleThresholds {
    fn default() -> Self {
        Self {
            momentum_threshold: 0.3,
            calm_threshold: 0.1,
            clutch_seconds: 120,
            close_margin: 8,
            blowout_margin: 14,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StyleSelector {
    thresholds: StyleThresholds,
}

impl StyleSelector {
    pub fn new(thresholds: StyleThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &StyleThresholds {
        &self.thresholds
    }

    fn is_clutch(&self, snapshot: &GameSnapshot) -> bool {
        snapshot.period >= snapshot.sport.regulation_periods()
            && snapshot.time_remaining_seconds <= self.thresholds.clutch_seconds
            && snapshot.score_margin() <= self.thresholds.close_margin
    }

    fn is_period_break(snapshot: &GameSnapshot) -> bool {
        snapshot.time_remaining_seconds == 0
            && snapshot.period < snapshot.sport.regulation_periods()
    }

    /// Style this snapshot calls for, ignoring history
    pub fn classify(&self, snapshot: &GameSnapshot) -> CommentaryStyle {
        let swing = snapshot.momentum.indicator().abs();

        if swing >= self.thresholds.momentum_threshold || self.is_clutch(snapshot) {
            CommentaryStyle::Excited
        } else if Self::is_period_break(snapshot)
            || (swing < self.thresholds.calm_threshold
                && snapshot.score_margin() >= self.thresholds.blowout_margin)
        {
            CommentaryStyle::Analytical
        } else {
            CommentaryStyle::Neutral
        }
    }

    /// Pick the style for `snapshot` given the previous tick's snapshot and style.
    pub fn select(
        &self,
        snapshot: &GameSnapshot,
        previous: Option<&GameSnapshot>,
        previous_style: Option<CommentaryStyle>,
    ) -> CommentaryStyle {
        let candidate = self.classify(snapshot);
        let Some(previous_style) = previous_style else {
            return candidate;
        };
        if candidate == previous_style {
            return candidate;
        }

        let confirmed = previous.is_some_and(|prev| self.classify(prev) == candidate);
        if confirmed {
            tracing::debug!(
                game_id = %snapshot.game_id,
                tick = snapshot.tick,
                from = %previous_style,
                to = %candidate,
                "style change"
            );
            candidate
        } else {
            previous_style
        }
    }
}
