use std::path::{Path, PathBuf};

use crate::error::PipelineError;

mod ffmpeg;

pub use ffmpeg::FfmpegTool;

/// Contract with the external media tool (ffmpeg/ffprobe in production).
///
/// Implementations are blocking; the pipeline runs one episode at a time and
/// waits on every invocation.
pub trait MediaTool {
    /// Playable duration of a media file in seconds. Always positive.
    fn probe_duration(&self, path: &Path) -> Result<f64, PipelineError>;

    /// Stream-copy the inputs, in order, into one video file. No re-encode,
    /// so inputs must share codec and container parameters.
    fn concat_copy(&self, inputs: &[PathBuf], output: &Path) -> Result<(), PipelineError>;

    /// Combine a video track with a narration track into the delivery file,
    /// re-encoded, truncated to the shorter stream and optionally hard-capped.
    fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        narration_secs: f64,
        max_secs: Option<f64>,
    ) -> Result<(), PipelineError>;

    /// Loop a still image against the narration track (legacy episodes).
    fn loop_still(
        &self,
        image: &Path,
        audio: &Path,
        output: &Path,
        narration_secs: f64,
        max_secs: Option<f64>,
    ) -> Result<(), PipelineError>;
}
