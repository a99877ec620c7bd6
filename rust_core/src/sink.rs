//! Output directory for commentary artifacts.
//!
//! Per line: `{game}_{tick:06}.txt` and, when synthesis succeeded,
//! `{game}_{tick:06}.wav`. Each game also gets an append-only `{game}.jsonl`
//! manifest with one record per persisted tick. Files are written to a
//! `.part` sibling and renamed into place, so readers never see half a file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{AudioClip, CommentaryLine, CommentaryStyle};

const PART_SUFFIX: &str = ".part";

/// File-name-safe form of a game id. `_` is reserved as the tick separator.
pub fn sanitize_game_id(game_id: &str) -> String {
    let cleaned: String = game_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "game".to_string()
    } else {
        cleaned
    }
}

/// First pair of ids that would share artifact files, if any
pub fn colliding_game_ids<S: AsRef<str>>(game_ids: &[S]) -> Option<(&str, &str)> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for id in game_ids {
        let id = id.as_ref();
        if let Some(first) = seen.insert(sanitize_game_id(id), id) {
            return Some((first, id));
        }
    }
    None
}

pub fn artifact_stem(game_id: &str, tick: u64) -> String {
    format!("{}_{:06}", sanitize_game_id(game_id), tick)
}

/// A decoded artifact file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub game: String,
    pub tick: u64,
    pub extension: String,
}

impl ArtifactName {
    pub fn parse(file_name: &str) -> Option<Self> {
        let (stem, extension) = file_name.rsplit_once('.')?;
        let (game, tick) = stem.rsplit_once('_')?;
        if game.is_empty() || tick.len() < 6 || !tick.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            game: game.to_string(),
            tick: tick.parse().ok()?,
            extension: extension.to_string(),
        })
    }
}

/// One manifest line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub game_id: String,
    pub tick: u64,
    pub style: CommentaryStyle,
    pub fallback: bool,
    pub text: String,
    pub text_file: String,
    pub audio_file: Option<String>,
    pub voice: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub home_score: u16,
    pub away_score: u16,
    pub period: u8,
    pub clock: String,
    pub momentum: f64,
    #[serde(default)]
    pub reported_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedArtifacts {
    pub text_path: PathBuf,
    pub audio_path: Option<PathBuf>,
    /// False when the files are on disk but the manifest append failed
    pub manifest_written: bool,
}

#[derive(Debug, Clone)]
pub struct OutputSink {
    root: PathBuf,
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut part = path.as_os_str().to_owned();
    part.push(PART_SUFFIX);
    let part = PathBuf::from(part);

    fs::write(&part, bytes).await?;
    if let Err(e) = fs::rename(&part, path).await {
        let _ = fs::remove_file(&part).await;
        return Err(e.into());
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl OutputSink {
    /// Use `root` as the output directory, creating it if needed
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn text_path(&self, game_id: &str, tick: u64) -> PathBuf {
        self.root.join(format!("{}.txt", artifact_stem(game_id, tick)))
    }

    pub fn audio_path(&self, clip: &AudioClip) -> PathBuf {
        self.root.join(format!(
            "{}.{}",
            artifact_stem(&clip.game_id, clip.tick),
            clip.format.extension()
        ))
    }

    pub fn manifest_path(&self, game_id: &str) -> PathBuf {
        self.root
            .join(format!("{}.jsonl", sanitize_game_id(game_id)))
    }

    /// Persist the text of `line`, then its audio if any, then the manifest record.
    ///
    /// Only a failed text write is an error. Once the text is on disk the tick
    /// counts as persisted, even if the audio or manifest write fails.
    #[tracing::instrument(skip_all, fields(game_id = %line.game_id(), tick = line.tick()))]
    pub async fn persist(
        &self,
        line: &CommentaryLine,
        audio: Option<&AudioClip>,
    ) -> Result<PersistedArtifacts> {
        let text_path = self.text_path(line.game_id(), line.tick());
        write_atomic(&text_path, format!("{}\n", line.text).as_bytes()).await?;

        let audio = match audio {
            Some(clip) if !clip.belongs_to(line) => {
                warn!(
                    clip_game = %clip.game_id,
                    clip_tick = clip.tick,
                    "audio clip does not match line, dropping it"
                );
                None
            }
            other => other,
        };

        let mut audio_path = None;
        if let Some(clip) = audio {
            let path = self.audio_path(clip);
            match write_atomic(&path, &clip.bytes).await {
                Ok(()) => audio_path = Some(path),
                // text is already on disk; a failed audio write leaves a text-only tick
                Err(e) => warn!(error = %e, "failed to write audio"),
            }
        }

        let snapshot = &line.snapshot;
        let record = ManifestRecord {
            game_id: line.game_id().to_string(),
            tick: line.tick(),
            style: line.style,
            fallback: line.is_fallback,
            text: line.text.clone(),
            text_file: file_name(&text_path),
            audio_file: audio_path.as_deref().map(file_name),
            voice: audio_path
                .as_ref()
                .and(audio)
                .map(|clip| clip.voice_name.clone()),
            home_team: snapshot.home_team.clone(),
            away_team: snapshot.away_team.clone(),
            home_score: snapshot.home_score,
            away_score: snapshot.away_score,
            period: snapshot.period,
            clock: snapshot.clock(),
            momentum: snapshot.momentum.indicator(),
            reported_at: snapshot.reported_at,
            fetched_at: snapshot.fetched_at,
            generated_at: line.generated_at,
        };
        let manifest_written = match self.append_manifest(&record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to append manifest record");
                false
            }
        };

        debug!(
            text = %text_path.display(),
            audio = audio_path.is_some(),
            manifest_written,
            "persisted"
        );
        Ok(PersistedArtifacts {
            text_path,
            audio_path,
            manifest_written,
        })
    }

    async fn append_manifest(&self, record: &ManifestRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).map_err(std::io::Error::from)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.manifest_path(&record.game_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// All manifest records for `game_id`, in write order. Unparseable lines are skipped.
    pub async fn read_manifest(&self, game_id: &str) -> Result<Vec<ManifestRecord>> {
        let path = self.manifest_path(game_id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }

    /// Remove artifacts (and leftover `.part` files) last modified more than `max_age` ago.
    ///
    /// Manifests are kept.
    pub async fn prune_older_than(&self, max_age: Duration) -> Result<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_artifact = name.ends_with(PART_SUFFIX)
                || ArtifactName::parse(&name).is_some_and(|a| a.extension != "jsonl");
            if !is_artifact {
                continue;
            }

            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let stale = metadata
                .modified()
                .ok()
                .and_then(|m| m.elapsed().ok())
                .is_some_and(|age| age >= max_age);
            if stale {
                match fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(file = %name, error = %e, "failed to prune"),
                }
            }
        }
        if removed > 0 {
            info!(removed, root = %self.root.display(), "pruned old artifacts");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AudioFormat, GameSnapshot, Momentum, Sport};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn line(game_id: &str, tick: u64) -> CommentaryLine {
        let snapshot = GameSnapshot {
            game_id: game_id.into(),
            tick,
            sport: Sport::NBA,
            home_team: "Lakers".into(),
            away_team: "Suns".into(),
            home_score: 101,
            away_score: 99,
            period: 4,
            time_remaining_seconds: 12,
            possession: Some("Suns".into()),
            recent_plays: vec![],
            momentum: Momentum::neutral(),
            performance: None,
            reported_at: None,
            fetched_at: Utc::now(),
        };
        CommentaryLine::new(
            Arc::new(snapshot),
            CommentaryStyle::Excited,
            "Twelve seconds left!".into(),
        )
    }

    fn clip(game_id: &str, tick: u64) -> AudioClip {
        AudioClip {
            game_id: game_id.into(),
            tick,
            style: CommentaryStyle::Excited,
            voice_name: "en-US-ChristopherNeural".into(),
            format: AudioFormat::Wav,
            bytes: b"RIFF....WAVE".to_vec(),
        }
    }

    #[test]
    fn test_sanitize_game_id() {
        assert_eq!(sanitize_game_id("401547"), "401547");
        assert_eq!(sanitize_game_id("nba/2026_10_18 LAL@PHX"), "nba-2026-10-18-LAL-PHX");
        assert_eq!(sanitize_game_id("  "), "game");
    }

    #[test]
    fn test_colliding_game_ids() {
        assert_eq!(colliding_game_ids(&["401547", "401548"]), None);
        assert_eq!(colliding_game_ids::<&str>(&[]), None);
        assert_eq!(
            colliding_game_ids(&["nba_1", "g2", "nba 1"]),
            Some(("nba_1", "nba 1"))
        );
        assert_eq!(colliding_game_ids(&["g1", "g1"]), Some(("g1", "g1")));
    }

    #[test]
    fn test_artifact_name_parse() {
        let name = ArtifactName::parse("nba-LAL-PHX_000042.wav").unwrap();
        assert_eq!(name.game, "nba-LAL-PHX");
        assert_eq!(name.tick, 42);
        assert_eq!(name.extension, "wav");

        assert_eq!(ArtifactName::parse(&format!("{}.txt", artifact_stem("g.1", 7))).unwrap().game, "g.1");
        assert!(ArtifactName::parse("game.jsonl").is_none());
        assert!(ArtifactName::parse("g_12.txt").is_none());
        assert!(ArtifactName::parse("g_000001.txt.part").is_none());
        assert!(ArtifactName::parse("_000001.txt").is_none());
    }

    #[tokio::test]
    async fn test_persist_text_and_audio() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::open(dir.path().join("out")).await.unwrap();

        let line = line("g1", 3);
        let artifacts = sink.persist(&line, Some(&clip("g1", 3))).await.unwrap();

        assert_eq!(file_name(&artifacts.text_path), "g1_000003.txt");
        assert_eq!(
            fs::read_to_string(&artifacts.text_path).await.unwrap(),
            "Twelve seconds left!\n"
        );
        let audio_path = artifacts.audio_path.unwrap();
        assert_eq!(file_name(&audio_path), "g1_000003.wav");
        assert_eq!(fs::read(&audio_path).await.unwrap(), b"RIFF....WAVE");

        let records = sink.read_manifest("g1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tick, 3);
        assert_eq!(records[0].audio_file.as_deref(), Some("g1_000003.wav"));
        assert_eq!(records[0].voice.as_deref(), Some("en-US-ChristopherNeural"));
        assert_eq!(records[0].clock, "00:12");
    }

    #[tokio::test]
    async fn test_persist_text_only() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::open(dir.path()).await.unwrap();

        let artifacts = sink.persist(&line("g1", 1), None).await.unwrap();
        assert!(artifacts.text_path.exists());
        assert!(artifacts.audio_path.is_none());

        // a clip for another tick is never written next to this line
        let artifacts = sink.persist(&line("g1", 2), Some(&clip("g1", 9))).await.unwrap();
        assert!(artifacts.audio_path.is_none());
        assert!(!dir.path().join("g1_000009.wav").exists());

        let records = sink.read_manifest("g1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.audio_file.is_none()));
    }

    #[tokio::test]
    async fn test_manifest_failure_keeps_written_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::open(dir.path()).await.unwrap();
        // a directory where the manifest file should be makes the append fail
        fs::create_dir(sink.manifest_path("g1")).await.unwrap();

        let artifacts = sink.persist(&line("g1", 4), Some(&clip("g1", 4))).await.unwrap();
        assert!(!artifacts.manifest_written);
        assert!(artifacts.text_path.exists());
        assert!(artifacts.audio_path.unwrap().exists());

        let artifacts = sink.persist(&line("g2", 4), None).await.unwrap();
        assert!(artifacts.manifest_written);
    }

    #[tokio::test]
    async fn test_no_part_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::open(dir.path()).await.unwrap();
        for tick in 1..=5 {
            sink.persist(&line("g1", tick), Some(&clip("g1", tick)))
                .await
                .unwrap();
        }

        let mut names = HashSet::new();
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
        assert!(names.iter().all(|n| !n.ends_with(PART_SUFFIX)));
        assert_eq!(names.len(), 11);
    }

    #[tokio::test]
    async fn test_prune_older_than() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::open(dir.path()).await.unwrap();
        sink.persist(&line("g1", 1), Some(&clip("g1", 1))).await.unwrap();
        fs::write(dir.path().join("notes.md"), "keep").await.unwrap();
        fs::write(dir.path().join("g1_000002.txt.part"), "partial").await.unwrap();

        assert_eq!(sink.prune_older_than(Duration::from_secs(3600)).await.unwrap(), 0);

        let removed = sink.prune_older_than(Duration::ZERO).await.unwrap();
        assert_eq!(removed, 3);
        assert!(dir.path().join("notes.md").exists());
        assert!(sink.manifest_path("g1").exists());
    }
}
