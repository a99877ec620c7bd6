//! Pipeline stage state machine

use std::fmt;

use commentary_core::CommentaryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Polling,
    Generating,
    Synthesizing,
    Persisting,
    Backoff,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Polling => "polling",
            PipelineState::Generating => "generating",
            PipelineState::Synthesizing => "synthesizing",
            PipelineState::Persisting => "persisting",
            PipelineState::Backoff => "backoff",
        }
    }

    /// Next stage after this one succeeds
    pub fn advance(self) -> Self {
        match self {
            PipelineState::Idle => PipelineState::Polling,
            PipelineState::Polling => PipelineState::Generating,
            PipelineState::Generating => PipelineState::Synthesizing,
            PipelineState::Synthesizing => PipelineState::Persisting,
            PipelineState::Persisting => PipelineState::Idle,
            PipelineState::Backoff => PipelineState::Polling,
        }
    }

    /// Stage entered when this one fails with `error`.
    ///
    /// A malformed reading skips the tick. A failed generation backs off (its
    /// fallback line still goes downstream). Audio and persistence failures
    /// never back off: the text continues on, or the tick ends.
    pub fn fail(self, error: &CommentaryError) -> Self {
        match (self, error) {
            (PipelineState::Polling, CommentaryError::MalformedResponse { .. }) => {
                PipelineState::Idle
            }
            (PipelineState::Polling, _) | (PipelineState::Generating, _) => PipelineState::Backoff,
            (PipelineState::Synthesizing, _) => PipelineState::Persisting,
            (PipelineState::Persisting, _) => PipelineState::Idle,
            (state, _) => state,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
