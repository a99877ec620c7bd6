//! Error taxonomy shared by every pipeline stage.
//!
//! Each variant maps to one recovery strategy in the orchestrator:
//! - `UpstreamUnavailable` - retry with backoff
//! - `MalformedResponse` - log and skip the tick
//! - `GenerationTimeout` / `GenerationRejected` - substitute a fallback line
//! - `SynthesisUnavailable` / `UnsupportedVoiceProfile` - persist text only

use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommentaryError {
    #[error("{service} unavailable: {message}")]
    UpstreamUnavailable {
        service: &'static str,
        message: String,
    },

    #[error("malformed response from {service}: {message}")]
    MalformedResponse {
        service: &'static str,
        message: String,
    },

    #[error("commentary generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    #[error("commentary generation rejected: {reason}")]
    GenerationRejected {
        reason: String,
        /// Server-provided hint (e.g. `Retry-After` on HTTP 429)
        retry_after: Option<Duration>,
    },

    #[error("speech synthesis unavailable: {0}")]
    SynthesisUnavailable(String),

    #[error("unsupported voice profile: {0}")]
    UnsupportedVoiceProfile(String),

    #[error("output sink error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CommentaryError>;

impl CommentaryError {
    pub fn upstream(service: &'static str, message: impl Display) -> Self {
        Self::UpstreamUnavailable {
            service,
            message: message.to_string(),
        }
    }

    pub fn malformed(service: &'static str, message: impl Display) -> Self {
        Self::MalformedResponse {
            service,
            message: message.to_string(),
        }
    }

    pub fn rejected(reason: impl Display) -> Self {
        Self::GenerationRejected {
            reason: reason.to_string(),
            retry_after: None,
        }
    }

    /// Transient failures worth another attempt (and worth counting against a circuit breaker)
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { .. }
                | Self::GenerationTimeout(_)
                | Self::SynthesisUnavailable(_)
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::GenerationRejected { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Stable short name for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::GenerationTimeout(_) => "generation_timeout",
            Self::GenerationRejected { .. } => "generation_rejected",
            Self::SynthesisUnavailable(_) => "synthesis_unavailable",
            Self::UnsupportedVoiceProfile(_) => "unsupported_voice_profile",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(CommentaryError::upstream("stats", "connection refused").is_retriable());
        assert!(CommentaryError::GenerationTimeout(Duration::from_secs(5)).is_retriable());
        assert!(CommentaryError::SynthesisUnavailable("503".into()).is_retriable());

        assert!(!CommentaryError::malformed("stats", "missing home_team").is_retriable());
        assert!(!CommentaryError::rejected("content policy").is_retriable());
        assert!(!CommentaryError::UnsupportedVoiceProfile("analytical".into()).is_retriable());
    }

    #[test]
    fn test_retry_after_only_on_rejection() {
        let err = CommentaryError::GenerationRejected {
            reason: "rate limited".into(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(err.kind(), "generation_rejected");
        assert_eq!(
            CommentaryError::upstream("llm", "down").retry_after(),
            None
        );
    }
}
