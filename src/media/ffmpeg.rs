use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use indicatif::{ProgressBar, ProgressStyle};
use tempfile::NamedTempFile;

use super::MediaTool;
use crate::error::PipelineError;
use crate::ui::is_debug_enabled;

/// Media tool backed by the system ffmpeg and ffprobe binaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegTool;

impl FfmpegTool {
    pub fn new() -> Self {
        Self
    }

    /// Run ffmpeg with stderr piped, feeding `time=` progress into a bar when
    /// the total duration is known and collecting error lines for reporting.
    fn run_ffmpeg(
        &self,
        args: &[String],
        total_secs: Option<f64>,
        label: &str,
    ) -> Result<(), String> {
        let mut child = Command::new("ffmpeg")
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to spawn ffmpeg: {e}"))?;

        let stderr = child.stderr.take().expect("stderr was piped");

        let pb = total_secs.map(|total| {
            let pb = ProgressBar::new((total * 1000.0) as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] ({eta}) {msg}")
                    .unwrap()
                    .progress_chars("█▉▊▋▌▍▎▏ "),
            );
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message(label.to_string());
            pb
        });

        let mut last_line = String::new();
        let mut error_lines: Vec<String> = Vec::new();
        let read_result = read_stderr(stderr, &pb, &mut last_line, &mut error_lines);

        let status = child
            .wait()
            .map_err(|e| format!("failed to wait for ffmpeg: {e}"))?;
        read_result?;

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        if !status.success() {
            let detail = if error_lines.is_empty() {
                last_line
            } else {
                error_lines.join("\n")
            };
            return Err(format!(
                "ffmpeg exited with status {:?}: {}",
                status.code(),
                detail.trim()
            ));
        }

        Ok(())
    }

    /// Run the mux-style invocations that produce the final delivery file.
    /// The output is written to a sibling `.part` file and only renamed into
    /// place on success, so an interrupted run never leaves a truncated file
    /// that passes the exists-check.
    fn run_to_part(
        &self,
        mut args: Vec<String>,
        output: &Path,
        total_secs: Option<f64>,
        label: &str,
    ) -> Result<(), PipelineError> {
        let part = part_path(output);
        args.push("-f".to_string());
        args.push("mp4".to_string());
        args.push(part.to_string_lossy().into_owned());

        match self.run_ffmpeg(&args, total_secs, label) {
            Ok(()) => {
                fs::rename(&part, output)?;
                Ok(())
            }
            Err(detail) => {
                let _ = fs::remove_file(&part);
                Err(PipelineError::AssemblyFailed(detail))
            }
        }
    }
}

impl MediaTool for FfmpegTool {
    fn probe_duration(&self, path: &Path) -> Result<f64, PipelineError> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .map_err(|e| PipelineError::ProbeFailed {
                path: path.to_path_buf(),
                reason: format!("failed to run ffprobe: {e}"),
            })?;

        if !output.status.success() {
            return Err(PipelineError::ProbeFailed {
                path: path.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let secs: f64 = stdout
            .trim()
            .parse()
            .map_err(|_| PipelineError::ProbeFailed {
                path: path.to_path_buf(),
                reason: format!("unparsable duration '{}'", stdout.trim()),
            })?;

        // A zero-length clip would never advance the cover sequencer.
        if !secs.is_finite() || secs <= 0.0 {
            return Err(PipelineError::ProbeFailed {
                path: path.to_path_buf(),
                reason: format!("non-positive duration {secs}"),
            });
        }

        Ok(secs)
    }

    fn concat_copy(&self, inputs: &[PathBuf], output: &Path) -> Result<(), PipelineError> {
        let mut list = NamedTempFile::new()?;
        for input in inputs {
            writeln!(list, "{}", concat_list_entry(input))?;
        }
        list.flush()?;

        let mut args: Vec<String> = ["-y", "-f", "concat", "-safe", "0", "-i"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(list.path().display().to_string());
        args.extend(["-c", "copy"].iter().map(|s| s.to_string()));
        args.push(output.display().to_string());

        match self.run_ffmpeg(&args, None, "concatenating clips") {
            Ok(()) => Ok(()),
            Err(detail) => {
                let _ = fs::remove_file(output);
                if looks_like_stream_mismatch(&detail) {
                    Err(PipelineError::IncompatibleClips(detail))
                } else {
                    Err(PipelineError::AssemblyFailed(detail))
                }
            }
        }
    }

    fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        narration_secs: f64,
        max_secs: Option<f64>,
    ) -> Result<(), PipelineError> {
        let mut args: Vec<String> = vec!["-y".to_string(), "-i".to_string()];
        args.push(video.display().to_string());
        args.push("-i".to_string());
        args.push(audio.display().to_string());
        args.extend(
            [
                "-map", "0:v:0", "-map", "1:a:0", "-c:v", "libx264", "-c:a", "aac", "-b:a",
                "192k", "-shortest",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        if let Some(cap) = max_secs {
            args.push("-t".to_string());
            args.push(cap.to_string());
        }

        let total = effective_duration(narration_secs, max_secs);
        self.run_to_part(args, output, Some(total), "muxing narration")
    }

    fn loop_still(
        &self,
        image: &Path,
        audio: &Path,
        output: &Path,
        narration_secs: f64,
        max_secs: Option<f64>,
    ) -> Result<(), PipelineError> {
        let mut args: Vec<String> = ["-y", "-loop", "1", "-i"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(image.display().to_string());
        args.push("-i".to_string());
        args.push(audio.display().to_string());
        args.extend(
            ["-c:v", "libx264", "-c:a", "aac", "-b:a", "192k", "-shortest"]
                .iter()
                .map(|s| s.to_string()),
        );
        if let Some(cap) = max_secs {
            args.push("-t".to_string());
            args.push(cap.to_string());
        }

        let total = effective_duration(narration_secs, max_secs);
        self.run_to_part(args, output, Some(total), "rendering still image")
    }
}

fn effective_duration(narration_secs: f64, max_secs: Option<f64>) -> f64 {
    match max_secs {
        Some(cap) => narration_secs.min(cap),
        None => narration_secs,
    }
}

fn part_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!("{name}.part"))
}

/// One line of an ffmpeg concat-demuxer list file. Single quotes inside the
/// path need the `'\''` dance.
fn concat_list_entry(path: &Path) -> String {
    let escaped = path.to_string_lossy().replace('\'', "'\\''");
    format!("file '{escaped}'")
}

/// Stream-copy concatenation only works when every input shares codec and
/// container parameters; ffmpeg reports violations in stderr rather than with
/// a dedicated exit code.
fn looks_like_stream_mismatch(detail: &str) -> bool {
    let lowered = detail.to_lowercase();
    ["do not match", "mismatch", "must have the same"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

fn read_stderr<R: Read>(
    mut stderr: R,
    pb: &Option<ProgressBar>,
    last_line: &mut String,
    error_lines: &mut Vec<String>,
) -> Result<(), String> {
    let mut buffer = [0u8; 4096];
    let mut accumulated = String::new();

    loop {
        let bytes_read = stderr
            .read(&mut buffer)
            .map_err(|e| format!("failed to read ffmpeg stderr: {e}"))?;
        if bytes_read == 0 {
            break;
        }

        let chunk = String::from_utf8_lossy(&buffer[..bytes_read]);
        accumulated.push_str(&chunk);

        // ffmpeg separates progress updates with carriage returns
        while let Some(pos) = accumulated.find(|c| c == '\r' || c == '\n') {
            let line = accumulated[..pos].to_string();
            accumulated = accumulated[pos + 1..].to_string();

            if line.is_empty() {
                continue;
            }

            *last_line = line.clone();

            if is_debug_enabled() {
                eprintln!("{}", line);
            }

            if line.contains("error") || line.contains("Error") || line.contains("ERROR") {
                error_lines.push(line.clone());
            }

            if let Some(pb) = pb {
                if let Some(progress_secs) = parse_progress_seconds(&line) {
                    pb.set_position((progress_secs * 1000.0) as u64);
                    if let Some(speed) = parse_speed(&line) {
                        pb.set_message(format!("{}x", speed));
                    }
                }
            }
        }
    }

    Ok(())
}

fn parse_progress_seconds(line: &str) -> Option<f64> {
    let start = line.find("time=")?;
    let token = line[start + 5..].split_whitespace().next()?;
    let mut parts = token.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn parse_speed(line: &str) -> Option<&str> {
    let start = line.find("speed=")?;
    let token = line[start + 6..].split_whitespace().next()?;
    Some(token.trim_end_matches('x'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_progress_time_lines() {
        let line = "frame= 120 fps= 30 time=00:01:05.50 bitrate= 900kbits/s speed=1.02x";
        let secs = parse_progress_seconds(line).unwrap();
        assert!((secs - 65.5).abs() < 1e-9);
        assert_eq!(parse_speed(line), Some("1.02"));
    }

    #[test]
    fn ignores_lines_without_progress() {
        assert_eq!(parse_progress_seconds("Press [q] to stop"), None);
        assert_eq!(parse_speed("no speed here"), None);
    }

    #[test]
    fn escapes_single_quotes_in_concat_entries() {
        let entry = concat_list_entry(Path::new("/clips/jay's day.mp4"));
        assert_eq!(entry, "file '/clips/jay'\\''s day.mp4'");
    }

    #[test]
    fn classifies_stream_mismatch_output() {
        assert!(looks_like_stream_mismatch(
            "Stream #0:0: video parameters do not match the reference"
        ));
        assert!(looks_like_stream_mismatch(
            "All inputs must have the same pixel format"
        ));
        assert!(!looks_like_stream_mismatch("No such file or directory"));
    }

    #[test]
    fn part_path_keeps_the_directory() {
        let part = part_path(Path::new("/out/ep01/video.mp4"));
        assert_eq!(part, Path::new("/out/ep01/video.mp4.part"));
    }

    #[test]
    fn effective_duration_is_capped() {
        assert_eq!(effective_duration(25.0, Some(60.0)), 25.0);
        assert_eq!(effective_duration(95.0, Some(60.0)), 60.0);
        assert_eq!(effective_duration(95.0, None), 95.0);
    }
}
