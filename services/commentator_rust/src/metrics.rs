//! Per-game pipeline counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use commentary_core::CommentaryError;
use serde::Serialize;

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    polls: AtomicU64,
    poll_failures: AtomicU64,
    ticks_skipped: AtomicU64,
    lines_generated: AtomicU64,
    fallback_lines: AtomicU64,
    audio_clips: AtomicU64,
    synthesis_failures: AtomicU64,
    artifacts_persisted: AtomicU64,
    persist_failures: AtomicU64,
    backoffs: AtomicU64,
    last_backoff_ms: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub polls: u64,
    pub poll_failures: u64,
    pub ticks_skipped: u64,
    pub lines_generated: u64,
    pub fallback_lines: u64,
    pub audio_clips: u64,
    pub synthesis_failures: u64,
    pub artifacts_persisted: u64,
    pub persist_failures: u64,
    pub backoffs: u64,
    pub last_backoff_ms: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_poll(&self, result: Result<(), &CommentaryError>) {
        bump(&self.polls);
        match result {
            Ok(()) => {}
            Err(CommentaryError::MalformedResponse { .. }) => bump(&self.ticks_skipped),
            Err(_) => bump(&self.poll_failures),
        }
    }

    pub fn record_line(&self, is_fallback: bool) {
        if is_fallback {
            bump(&self.fallback_lines);
        } else {
            bump(&self.lines_generated);
        }
    }

    pub fn record_synthesis(&self, ok: bool) {
        if ok {
            bump(&self.audio_clips);
        } else {
            bump(&self.synthesis_failures);
        }
    }

    pub fn record_persist(&self, ok: bool) {
        if ok {
            bump(&self.artifacts_persisted);
        } else {
            bump(&self.persist_failures);
        }
    }

    pub fn record_backoff(&self, delay: Duration) {
        bump(&self.backoffs);
        self.last_backoff_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            polls: load(&self.polls),
            poll_failures: load(&self.poll_failures),
            ticks_skipped: load(&self.ticks_skipped),
            lines_generated: load(&self.lines_generated),
            fallback_lines: load(&self.fallback_lines),
            audio_clips: load(&self.audio_clips),
            synthesis_failures: load(&self.synthesis_failures),
            artifacts_persisted: load(&self.artifacts_persisted),
            persist_failures: load(&self.persist_failures),
            backoffs: load(&self.backoffs),
            last_backoff_ms: load(&self.last_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_outcomes() {
        let metrics = PipelineMetrics::new();
        metrics.record_poll(Ok(()));
        metrics.record_poll(Err(&CommentaryError::malformed("stats", "bad clock")));
        metrics.record_poll(Err(&CommentaryError::upstream("stats", "503")));

        let snap = metrics.snapshot();
        assert_eq!(snap.polls, 3);
        assert_eq!(snap.ticks_skipped, 1);
        assert_eq!(snap.poll_failures, 1);
    }

    #[test]
    fn test_backoff_and_lines() {
        let metrics = PipelineMetrics::new();
        metrics.record_line(false);
        metrics.record_line(true);
        metrics.record_backoff(Duration::from_millis(1500));
        metrics.record_backoff(Duration::from_secs(3));

        let snap = metrics.snapshot();
        assert_eq!((snap.lines_generated, snap.fallback_lines), (1, 1));
        assert_eq!(snap.backoffs, 2);
        assert_eq!(snap.last_backoff_ms, 3000);
    }
}
