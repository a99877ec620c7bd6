//! Voice profiles and speech synthesis for commentary lines.
//!
//! Each commentary style maps to one voice profile (voice, speaking style,
//! rate, pitch). A line is rendered to SSML with its style's profile and sent
//! to the speech engine. Audio is best-effort: callers persist the text even
//! when this fails.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::clients::azure_speech::VoiceInfo;
use crate::clients::{SpeechEngine, SpeechRequest};
use crate::error::{CommentaryError, Result};
use crate::models::{AudioClip, CommentaryLine, CommentaryStyle};

pub const MIN_RATE: f32 = 0.5;
pub const MAX_RATE: f32 = 2.0;
pub const MIN_PITCH: i32 = -12;
pub const MAX_PITCH: i32 = 12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceProfile {
    pub voice_name: String,
    /// Speaking style passed through `mstts:express-as`, if the voice supports one
    pub express_style: Option<String>,
    /// Speaking rate multiplier (1.0 = normal)
    pub rate: f32,
    /// Pitch offset in semitones
    pub pitch: i8,
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

impl VoiceProfile {
    pub fn new(voice_name: impl Into<String>, rate: f32, pitch: i32) -> Self {
        Self {
            voice_name: voice_name.into(),
            express_style: None,
            rate: clamp_rate(rate),
            pitch: clamp_pitch(pitch),
        }
    }

    /// `en-US` from `en-US-GuyNeural`
    pub fn locale(&self) -> &str {
        let mut dashes = self.voice_name.match_indices('-').map(|(i, _)| i);
        match (dashes.next(), dashes.next()) {
            (Some(_), Some(end)) => &self.voice_name[..end],
            _ => "en-US",
        }
    }

    fn rate_percent(&self) -> i32 {
        ((self.rate - 1.0) * 100.0).round() as i32
    }

    pub fn to_ssml(&self, text: &str) -> String {
        let prosody = format!(
            "<prosody rate=\"{:+}%\" pitch=\"{:+}st\">{}</prosody>",
            self.rate_percent(),
            self.pitch,
            xml_escape(text)
        );
        let inner = match &self.express_style {
            Some(style) => format!(
                "<mstts:express-as style=\"{}\">{}</mstts:express-as>",
                xml_escape(style),
                prosody
            ),
            None => prosody,
        };
        format!(
            "<speak version=\"1.0\" xmlns=\"http://www.w3.org/2001/10/synthesis\" \
             xmlns:mstts=\"https://www.w3.org/2001/mstts\" xml:lang=\"{}\">\
             <voice name=\"{}\">{}</voice></speak>",
            self.locale(),
            xml_escape(&self.voice_name),
            inner
        )
    }
}

fn clamp_rate(rate: f32) -> f32 {
    if rate.is_nan() {
        return 1.0;
    }
    rate.clamp(MIN_RATE, MAX_RATE)
}

fn clamp_pitch(pitch: i32) -> i8 {
    pitch.clamp(MIN_PITCH, MAX_PITCH) as i8
}

/// Style -> voice profile table
#[derive(Debug, Clone)]
pub struct VoiceProfiles {
    profiles: HashMap<CommentaryStyle, VoiceProfile>,
}

impl Default for VoiceProfiles {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            CommentaryStyle::Excited,
            VoiceProfile::new("en-US-ChristopherNeural", 1.1, 2),
        );
        profiles.insert(
            CommentaryStyle::Neutral,
            VoiceProfile::new("en-US-GuyNeural", 1.0, 0),
        );
        profiles.insert(
            CommentaryStyle::Analytical,
            VoiceProfile::new("en-US-RogerNeural", 0.9, -1),
        );
        Self { profiles }
    }
}

impl VoiceProfiles {
    pub fn empty() -> Self {
        Self {
            profiles: HashMap::new(),
        }
    }

    pub fn insert(&mut self, style: CommentaryStyle, profile: VoiceProfile) {
        self.profiles.insert(style, profile);
    }

    pub fn get(&self, style: CommentaryStyle) -> Result<&VoiceProfile> {
        self.profiles
            .get(&style)
            .ok_or_else(|| CommentaryError::UnsupportedVoiceProfile(style.to_string()))
    }

    /// Adjust an existing profile. Rate is clamped to [0.5, 2.0], pitch to [-12, 12].
    pub fn update_profile(
        &mut self,
        style: CommentaryStyle,
        voice_name: Option<&str>,
        rate: Option<f32>,
        pitch: Option<i32>,
    ) -> Result<()> {
        let profile = self
            .profiles
            .get_mut(&style)
            .ok_or_else(|| CommentaryError::UnsupportedVoiceProfile(style.to_string()))?;
        if let Some(name) = voice_name.filter(|n| !n.trim().is_empty()) {
            profile.voice_name = name.trim().to_string();
        }
        if let Some(rate) = rate {
            profile.rate = clamp_rate(rate);
        }
        if let Some(pitch) = pitch {
            profile.pitch = clamp_pitch(pitch);
        }
        Ok(())
    }

    /// Profiles whose voice is missing from `available`
    pub fn unknown_voices(&self, available: &[VoiceInfo]) -> Vec<(CommentaryStyle, String)> {
        let mut missing: Vec<(CommentaryStyle, String)> = CommentaryStyle::ALL
            .iter()
            .filter_map(|style| self.profiles.get(style).map(|p| (*style, p)))
            .filter(|(_, p)| !available.iter().any(|v| v.short_name == p.voice_name))
            .map(|(style, p)| (style, p.voice_name.clone()))
            .collect();
        missing.sort_by_key(|(style, _)| style.as_str());
        missing
    }
}

#[derive(Debug, Default)]
pub struct SynthesisStats {
    total: AtomicU64,
    errors: AtomicU64,
    bytes: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SynthesisStatsSnapshot {
    pub total: u64,
    pub errors: u64,
    pub bytes: u64,
}

impl SynthesisStats {
    fn record(&self, result: &Result<AudioClip>) {
        self.total.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(clip) => {
                self.bytes.fetch_add(clip.bytes.len() as u64, Ordering::Relaxed);
            }
            Err(_) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> SynthesisStatsSnapshot {
        SynthesisStatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

pub struct VoiceSynthesizer {
    engine: Arc<dyn SpeechEngine>,
    profiles: VoiceProfiles,
    timeout: Duration,
    breaker: CircuitBreaker,
    stats: SynthesisStats,
}

impl VoiceSynthesizer {
    pub fn new(engine: Arc<dyn SpeechEngine>, profiles: VoiceProfiles, timeout: Duration) -> Self {
        Self {
            engine,
            profiles,
            timeout,
            breaker: CircuitBreaker::with_defaults("speech"),
            stats: SynthesisStats::default(),
        }
    }

    pub fn profiles(&self) -> &VoiceProfiles {
        &self.profiles
    }

    pub fn stats(&self) -> SynthesisStatsSnapshot {
        self.stats.snapshot()
    }

    async fn render(&self, line: &CommentaryLine) -> Result<AudioClip> {
        let profile = self.profiles.get(line.style)?;
        let request = SpeechRequest {
            voice_name: profile.voice_name.clone(),
            ssml: profile.to_ssml(&line.text),
        };
        let timeout = self.timeout;

        let bytes = self
            .breaker
            .call(async {
                match tokio::time::timeout(timeout, self.engine.render(&request)).await {
                    Ok(result) => result,
                    Err(_) => Err(CommentaryError::SynthesisUnavailable(format!(
                        "timed out after {timeout:?}"
                    ))),
                }
            })
            .await?;

        Ok(AudioClip {
            game_id: line.game_id().to_string(),
            tick: line.tick(),
            style: line.style,
            voice_name: request.voice_name,
            format: self.engine.output_format(),
            bytes,
        })
    }

    /// Render `line` with the voice profile of its style.
    #[tracing::instrument(skip_all, fields(game_id = %line.game_id(), tick = line.tick(), style = %line.style))]
    pub async fn synthesize(&self, line: &CommentaryLine) -> Result<AudioClip> {
        let result = self.render(line).await;
        self.stats.record(&result);
        match &result {
            Ok(clip) => debug!(voice = %clip.voice_name, bytes = clip.bytes.len(), "synthesized"),
            Err(e) => warn!(error = %e, "speech synthesis failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AudioFormat, GameSnapshot, Momentum, Sport};
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    struct FakeEngine {
        fail: bool,
        requests: Mutex<Vec<SpeechRequest>>,
    }

    #[async_trait]
    impl SpeechEngine for FakeEngine {
        async fn render(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
            self.requests.lock().push(request.clone());
            if self.fail {
                Err(CommentaryError::SynthesisUnavailable("503".into()))
            } else {
                Ok(vec![0u8; 64])
            }
        }

        fn output_format(&self) -> AudioFormat {
            AudioFormat::Wav
        }
    }

    fn engine(fail: bool) -> Arc<FakeEngine> {
        Arc::new(FakeEngine {
            fail,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn line(style: CommentaryStyle, text: &str) -> CommentaryLine {
        let snapshot = GameSnapshot {
            game_id: "g1".into(),
            tick: 3,
            sport: Sport::MLB,
            home_team: "Cubs".into(),
            away_team: "Sox".into(),
            home_score: 4,
            away_score: 1,
            period: 7,
            time_remaining_seconds: 0,
            possession: None,
            recent_plays: vec![],
            momentum: Momentum::neutral(),
            performance: None,
            reported_at: None,
            fetched_at: Utc::now(),
        };
        CommentaryLine::new(Arc::new(snapshot), style, text.to_string())
    }

    #[test]
    fn test_ssml_rendering() {
        let mut profile = VoiceProfile::new("en-US-ChristopherNeural", 1.1, 2);
        let ssml = profile.to_ssml("Cubs & Sox <tied>");
        assert!(ssml.contains("xml:lang=\"en-US\""));
        assert!(ssml.contains("<voice name=\"en-US-ChristopherNeural\">"));
        assert!(ssml.contains("rate=\"+10%\" pitch=\"+2st\""));
        assert!(ssml.contains("Cubs &amp; Sox &lt;tied&gt;"));
        assert!(!ssml.contains("express-as"));

        profile.express_style = Some("excited".into());
        profile.rate = 0.9;
        profile.pitch = -1;
        let ssml = profile.to_ssml("ok");
        assert!(ssml.contains("<mstts:express-as style=\"excited\">"));
        assert!(ssml.contains("rate=\"-10%\" pitch=\"-1st\""));
    }

    #[test]
    fn test_update_profile_clamps() {
        let mut profiles = VoiceProfiles::default();
        profiles
            .update_profile(CommentaryStyle::Neutral, Some("en-GB-RyanNeural"), Some(3.5), Some(-40))
            .unwrap();
        let profile = profiles.get(CommentaryStyle::Neutral).unwrap();
        assert_eq!(profile.voice_name, "en-GB-RyanNeural");
        assert_eq!(profile.rate, MAX_RATE);
        assert_eq!(profile.pitch, -12);
        assert_eq!(profile.locale(), "en-GB");

        profiles
            .update_profile(CommentaryStyle::Neutral, None, Some(0.1), Some(99))
            .unwrap();
        let profile = profiles.get(CommentaryStyle::Neutral).unwrap();
        assert_eq!(profile.rate, MIN_RATE);
        assert_eq!(profile.pitch, 12);
    }

    #[test]
    fn test_unknown_voices() {
        let available = vec![VoiceInfo {
            short_name: "en-US-GuyNeural".into(),
            locale: "en-US".into(),
            gender: "Male".into(),
            style_list: vec![],
        }];
        let missing = VoiceProfiles::default().unknown_voices(&available);
        let styles: Vec<CommentaryStyle> = missing.iter().map(|(s, _)| *s).collect();
        assert_eq!(styles, vec![CommentaryStyle::Analytical, CommentaryStyle::Excited]);
    }

    #[tokio::test]
    async fn test_synthesize_uses_style_profile() {
        let fake = engine(false);
        let synth = VoiceSynthesizer::new(fake.clone(), VoiceProfiles::default(), Duration::from_secs(5));

        let line = line(CommentaryStyle::Analytical, "Four to one after seven.");
        let clip = synth.synthesize(&line).await.unwrap();
        assert!(clip.belongs_to(&line));
        assert_eq!(clip.voice_name, "en-US-RogerNeural");
        assert_eq!(clip.format, AudioFormat::Wav);
        assert!(fake.requests.lock()[0].ssml.contains("Four to one after seven."));

        let stats = synth.stats();
        assert_eq!((stats.total, stats.errors, stats.bytes), (1, 0, 64));
    }

    #[tokio::test]
    async fn test_missing_profile_is_unsupported() {
        let fake = engine(false);
        let mut profiles = VoiceProfiles::empty();
        profiles.insert(CommentaryStyle::Neutral, VoiceProfile::new("en-US-GuyNeural", 1.0, 0));
        let synth = VoiceSynthesizer::new(fake.clone(), profiles, Duration::from_secs(5));

        let err = synth
            .synthesize(&line(CommentaryStyle::Excited, "Home run!"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommentaryError::UnsupportedVoiceProfile(_)));
        assert!(fake.requests.lock().is_empty());
        assert_eq!(synth.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_engine_outage() {
        let synth = VoiceSynthesizer::new(engine(true), VoiceProfiles::default(), Duration::from_secs(5));
        let err = synth
            .synthesize(&line(CommentaryStyle::Neutral, "Pitching change."))
            .await
            .unwrap_err();
        assert!(matches!(err, CommentaryError::SynthesisUnavailable(_)));
    }
}
