use std::path::PathBuf;
use thiserror::Error;

/// Failure kinds the pipeline recovers from at the command boundary.
///
/// None of these crash the process; a failed stage simply leaves its artifact
/// absent so the next invocation retries it.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Episode store unavailable at {path}: {reason}")]
    StoreUnavailable { path: PathBuf, reason: String },

    #[error("Script generation failed: {0}")]
    ScriptFailed(String),

    #[error("Narration synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Image generation failed: {0}")]
    ImageFailed(String),

    #[error("Could not probe duration of {path}: {reason}")]
    ProbeFailed { path: PathBuf, reason: String },

    #[error("No usable clips found in {}", .0.display())]
    NoClipsAvailable(PathBuf),

    #[error("Clips cannot be concatenated without re-encoding: {0}")]
    IncompatibleClips(String),

    #[error("Video assembly failed: {0}")]
    AssemblyFailed(String),

    #[error("Logged into channel '{actual}' but expected '{expected}'")]
    AuthMismatch { expected: String, actual: String },

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
