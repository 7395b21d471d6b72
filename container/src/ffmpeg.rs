//! Thin async driver around the `ffmpeg` and `ffprobe` executables.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::error::{Result, SplitError};

/// Output naming for the segment muxer; `Workspace::parts` matches it.
pub const PART_PATTERN: &str = "part_%03d.mp4";

const DANGEROUS_CHARS: [char; 11] = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl Ffmpeg {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Result<Self> {
        let ffmpeg_path = ffmpeg_path.into();
        let ffprobe_path = ffprobe_path.into();
        validate_executable(&ffmpeg_path)?;
        validate_executable(&ffprobe_path)?;
        Ok(Self {
            ffmpeg_path,
            ffprobe_path,
        })
    }

    #[tracing::instrument(skip(self), fields(ffprobe = %self.ffprobe_path))]
    pub async fn probe_duration(&self, input: &Path) -> Result<Duration> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(input)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| SplitError::Spawn {
                program: self.ffprobe_path.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SplitError::Probe(format!(
                "ffprobe exited with {}",
                output.status
            )));
        }

        parse_probe_duration(&output.stdout)
    }

    /// Cuts `input` into `segment_secs`-long stream copies inside `output_dir`.
    ///
    /// `on_percent` receives each distinct completion percentage; 100 is only
    /// reported once ffmpeg has exited successfully. When the input duration
    /// cannot be probed the intermediate updates are skipped.
    #[tracing::instrument(skip(self, on_percent), fields(ffmpeg = %self.ffmpeg_path))]
    pub async fn split_segments<F>(
        &self,
        input: &Path,
        output_dir: &Path,
        segment_secs: u64,
        mut on_percent: F,
    ) -> Result<()>
    where
        F: FnMut(u8) + Send,
    {
        if segment_secs == 0 {
            return Err(SplitError::InvalidSegment(segment_secs));
        }

        let total = match self.probe_duration(input).await {
            Ok(duration) => Some(duration),
            Err(e) => {
                tracing::warn!(error = %e, "Could not probe duration; progress limited to completion");
                None
            }
        };

        let mut child = Command::new(&self.ffmpeg_path)
            .args(segment_args(input, output_dir, segment_secs))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SplitError::Spawn {
                program: self.ffmpeg_path.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("ffmpeg stdout was not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("ffmpeg stderr was not captured"))?;

        let mut tracker = ProgressTracker::new(total);
        let progress = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(percent) = tracker.observe(&line) {
                    on_percent(percent);
                }
            }
            Ok::<_, std::io::Error>(())
        };
        // Both pipes are drained together so a chatty stderr cannot stall ffmpeg.
        let diagnostics = async {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).await.map(|_| buf)
        };
        let ((), stderr_bytes) = tokio::try_join!(progress, diagnostics)?;

        let status = child.wait().await?;
        if !status.success() {
            let stderr = stderr_tail(&String::from_utf8_lossy(&stderr_bytes));
            tracing::error!(%status, %stderr, "FFmpeg error");
            return Err(SplitError::FfmpegFailed { stderr });
        }

        if let Some(percent) = tracker.complete() {
            on_percent(percent);
        }
        Ok(())
    }
}

fn validate_executable(path: &str) -> Result<()> {
    if path.is_empty() || path.chars().any(|c| DANGEROUS_CHARS.contains(&c)) {
        return Err(SplitError::InvalidExecutable(path.to_string()));
    }
    Ok(())
}

/// Arguments for the ffmpeg segment muxer writing `PART_PATTERN` files.
pub fn segment_args(input: &Path, output_dir: &Path, segment_secs: u64) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-i"].iter().map(OsString::from).collect();
    args.push(input.as_os_str().to_owned());
    args.extend(
        [
            "-c",
            "copy",
            "-map",
            "0",
            "-f",
            "segment",
            "-segment_time",
        ]
        .iter()
        .map(OsString::from),
    );
    args.push(segment_secs.to_string().into());
    args.extend(
        ["-reset_timestamps", "1", "-progress", "pipe:1", "-nostats"]
            .iter()
            .map(OsString::from),
    );
    args.push(output_dir.join(PART_PATTERN).into_os_string());
    args
}

fn parse_probe_duration(stdout: &[u8]) -> Result<Duration> {
    let probe: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| SplitError::Probe(format!("unreadable ffprobe output: {e}")))?;

    let raw = &probe["format"]["duration"];
    let secs = raw
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| raw.as_f64())
        .filter(|s| s.is_finite() && *s >= 0.0)
        .ok_or_else(|| SplitError::Probe("no format.duration in ffprobe output".to_string()))?;

    Ok(Duration::from_secs_f64(secs))
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Turns ffmpeg `-progress` key/value lines into percentages.
#[derive(Debug)]
struct ProgressTracker {
    total_us: Option<u64>,
    last: Option<u8>,
}

impl ProgressTracker {
    fn new(total: Option<Duration>) -> Self {
        Self {
            total_us: total
                .map(|d| d.as_micros().min(u64::MAX as u128) as u64)
                .filter(|us| *us > 0),
            last: None,
        }
    }

    fn observe(&mut self, line: &str) -> Option<u8> {
        let (key, value) = line.trim().split_once('=')?;
        let percent = match key {
            // ffmpeg reports both keys in microseconds.
            "out_time_us" | "out_time_ms" => {
                let total = self.total_us?;
                let done = value.parse::<u64>().ok()?;
                // 100 is held back for a successful exit.
                (done.saturating_mul(100) / total).min(99) as u8
            }
            _ => return None,
        };
        self.update(percent)
    }

    fn complete(&mut self) -> Option<u8> {
        self.update(100)
    }

    fn update(&mut self, percent: u8) -> Option<u8> {
        if self.last == Some(percent) {
            return None;
        }
        self.last = Some(percent);
        Some(percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn rejects_executables_with_shell_metacharacters() {
        assert!(Ffmpeg::new("/usr/bin/ffmpeg", "/usr/bin/ffprobe").is_ok());
        assert!(matches!(
            Ffmpeg::new("ffmpeg; rm -rf /", "ffprobe"),
            Err(SplitError::InvalidExecutable(_))
        ));
        assert!(Ffmpeg::new("ffmpeg", "").is_err());
    }

    #[test]
    fn segment_args_match_the_muxer_invocation() {
        let args = segment_args(
            &PathBuf::from("uploads/in.mp4"),
            &PathBuf::from("output"),
            30,
        );
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let expected_out = PathBuf::from("output")
            .join(PART_PATTERN)
            .to_string_lossy()
            .into_owned();
        assert_eq!(
            args,
            vec![
                "-y",
                "-i",
                "uploads/in.mp4",
                "-c",
                "copy",
                "-map",
                "0",
                "-f",
                "segment",
                "-segment_time",
                "30",
                "-reset_timestamps",
                "1",
                "-progress",
                "pipe:1",
                "-nostats",
                expected_out.as_str(),
            ]
        );
    }

    #[test]
    fn probe_duration_reads_string_or_number() {
        let parsed = parse_probe_duration(br#"{"format":{"duration":"12.500000"}}"#).unwrap();
        assert_eq!(parsed, Duration::from_millis(12_500));

        let parsed = parse_probe_duration(br#"{"format":{"duration":3.0}}"#).unwrap();
        assert_eq!(parsed, Duration::from_secs(3));

        assert!(matches!(
            parse_probe_duration(br#"{"format":{}}"#),
            Err(SplitError::Probe(_))
        ));
        assert!(parse_probe_duration(b"not json").is_err());
    }

    #[test]
    fn tracker_reports_distinct_percentages_and_holds_back_completion() {
        let mut tracker = ProgressTracker::new(Some(Duration::from_secs(10)));
        assert_eq!(tracker.observe("frame=12"), None);
        assert_eq!(tracker.observe("out_time_us=2500000"), Some(25));
        assert_eq!(tracker.observe("out_time_ms=2500000"), None);
        assert_eq!(tracker.observe("out_time_us=N/A"), None);
        assert_eq!(tracker.observe("out_time_us=10000000"), Some(99));
        assert_eq!(tracker.observe("progress=end"), None);
        assert_eq!(tracker.complete(), Some(100));
        assert_eq!(tracker.complete(), None);
    }

    #[test]
    fn tracker_without_duration_only_completes() {
        let mut tracker = ProgressTracker::new(None);
        assert_eq!(tracker.observe("out_time_us=5000000"), None);
        assert_eq!(tracker.complete(), Some(100));
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let stderr: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(&stderr);
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }

    #[tokio::test]
    async fn zero_segment_length_is_rejected_before_spawning() {
        let ffmpeg = Ffmpeg::new("definitely-not-ffmpeg", "definitely-not-ffprobe").unwrap();
        let err = ffmpeg
            .split_segments(Path::new("in.mp4"), Path::new("out"), 0, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, SplitError::InvalidSegment(0)));
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let ffmpeg = Ffmpeg::new("definitely-not-ffmpeg", "definitely-not-ffprobe").unwrap();
        let err = ffmpeg
            .split_segments(Path::new("in.mp4"), Path::new("out"), 5, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, SplitError::Spawn { .. }));
    }
}
