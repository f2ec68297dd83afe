use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::media::MediaTool;
use crate::store::{Episode, artifact_present};
use crate::ui::prelude::{Level, emit};

const CLIP_EXTENSIONS: [&str; 5] = ["mp4", "mov", "mkv", "webm", "m4v"];

/// The shared read-only pool of stock footage files.
///
/// Clips are immutable and owned by the pool directory, never by an episode.
/// Durations are probed per draw, not cached across runs.
#[derive(Debug, Clone)]
pub struct ClipPool {
    dir: PathBuf,
    clips: Vec<PathBuf>,
}

impl ClipPool {
    /// Scan the pool directory for clip files. A missing or empty directory
    /// yields an empty pool; the sequencer reports that as `NoClipsAvailable`.
    pub fn scan(dir: &Path) -> Result<Self, PipelineError> {
        let mut clips = Vec::new();
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                let is_clip = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| CLIP_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false);
                if path.is_file() && is_clip {
                    clips.push(path);
                }
            }
        }
        clips.sort();
        Ok(Self {
            dir: dir.to_path_buf(),
            clips,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn clips(&self) -> &[PathBuf] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

/// Greedy randomized cover: draw clips uniformly with replacement until their
/// combined duration reaches the target.
///
/// The stop condition is checked after accumulating each draw, so the
/// concatenated result never undershoots the narration; the excess is trimmed
/// later by the mux step. Termination holds because the prober rejects
/// non-positive durations.
pub fn sequence_clips<R: Rng>(
    pool: &ClipPool,
    target_secs: f64,
    media: &dyn MediaTool,
    rng: &mut R,
) -> Result<Vec<PathBuf>, PipelineError> {
    if target_secs <= 0.0 {
        return Ok(Vec::new());
    }
    if pool.is_empty() {
        return Err(PipelineError::NoClipsAvailable(pool.dir().to_path_buf()));
    }

    let mut sequence = Vec::new();
    let mut covered = 0.0f64;
    while covered < target_secs {
        let clip = &pool.clips()[rng.gen_range(0..pool.len())];
        covered += media.probe_duration(clip)?;
        sequence.push(clip.clone());
    }
    Ok(sequence)
}

/// One of the two historical ways an episode video gets built.
pub trait VideoAssemblyStrategy {
    fn assemble(&self, episode: &Episode, media: &dyn MediaTool) -> Result<(), PipelineError>;
}

/// Core strategy: cover the narration with stock clips, stream-copy them into
/// one silent track, then mux the narration over it.
pub struct ClipLibraryAssembly {
    clips_dir: PathBuf,
    max_secs: Option<f64>,
}

impl ClipLibraryAssembly {
    pub fn new(clips_dir: PathBuf, max_secs: Option<f64>) -> Self {
        Self { clips_dir, max_secs }
    }
}

impl VideoAssemblyStrategy for ClipLibraryAssembly {
    fn assemble(&self, episode: &Episode, media: &dyn MediaTool) -> Result<(), PipelineError> {
        let narration = episode.voice_path();
        let narration_secs = media.probe_duration(&narration)?;

        let pool = ClipPool::scan(&self.clips_dir)?;
        let sequence = sequence_clips(&pool, narration_secs, media, &mut rand::thread_rng())?;
        emit(
            Level::Info,
            "assembly.sequence",
            &format!(
                "Covering {:.1}s of narration with {} clips",
                narration_secs,
                sequence.len()
            ),
            None,
        );

        let concat = episode.concat_path();
        media.concat_copy(&sequence, &concat)?;

        let result = media.mux(
            &concat,
            &narration,
            &episode.video_path(),
            narration_secs,
            self.max_secs,
        );
        let _ = fs::remove_file(&concat);
        result
    }
}

/// Legacy strategy: loop one generated image for the whole narration.
pub struct StillImageAssembly {
    max_secs: Option<f64>,
}

impl StillImageAssembly {
    pub fn new(max_secs: Option<f64>) -> Self {
        Self { max_secs }
    }
}

impl VideoAssemblyStrategy for StillImageAssembly {
    fn assemble(&self, episode: &Episode, media: &dyn MediaTool) -> Result<(), PipelineError> {
        let image = episode.image_path();
        if !artifact_present(&image) {
            return Err(PipelineError::AssemblyFailed(format!(
                "missing image artifact {}",
                image.display()
            )));
        }

        let narration = episode.voice_path();
        let narration_secs = media.probe_duration(&narration)?;
        media.loop_still(
            &image,
            &narration,
            &episode.video_path(),
            narration_secs,
            self.max_secs,
        )
    }
}
