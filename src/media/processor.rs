use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::MediaConfig;
use crate::error::{Result, SplicerError};
use super::{DiagnosticTail, MediaCommand, StreamProfile, TranscodeEngine, TranscodeOutcome};

/// ffprobe `-of json` output, reduced to the fields we read
#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl StreamProfile {
    /// Build a profile from ffprobe JSON output
    pub fn from_probe_json(json: &str) -> Result<Self> {
        let output: ProbeOutput = serde_json::from_str(json)?;
        let has_type = |kind: &str| {
            output
                .streams
                .iter()
                .any(|s| s.codec_type.as_deref() == Some(kind))
        };

        Ok(Self {
            has_audio: has_type("audio"),
            has_video: has_type("video"),
            duration: output
                .format
                .as_ref()
                .and_then(|f| f.duration.as_deref())
                .and_then(|d| d.trim().parse::<f64>().ok())
                .filter(|d| d.is_finite() && *d > 0.0),
        })
    }
}

/// Concrete engine backed by the ffmpeg and ffprobe executables
pub struct FfmpegEngine {
    config: MediaConfig,
}

impl FfmpegEngine {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Spawn `binary` and wait for it within the invocation timeout.
    ///
    /// Returns `Ok(None)` when the timeout elapsed; the child is killed when
    /// its handle is dropped.
    async fn run(&self, binary: &str, args: &[String]) -> Result<Option<Output>> {
        let mut cmd = Command::new(binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| SplicerError::Media(format!("Failed to execute {}: {}", binary, e)))?;

        match tokio::time::timeout(self.timeout(), child.wait_with_output()).await {
            Ok(output) => Ok(Some(output?)),
            Err(_) => Ok(None),
        }
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    async fn probe(&self, path: &Path) -> Result<StreamProfile> {
        let args: Vec<String> = [
            "-v",
            "error",
            "-show_entries",
            "stream=codec_type:format=duration",
            "-of",
            "json",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(path.to_string_lossy().to_string()))
        .collect();

        debug!("Probing {}", path.display());
        let output = self
            .run(&self.config.ffprobe_path, &args)
            .await?
            .ok_or_else(|| SplicerError::Media(format!("ffprobe timed out on {}", path.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SplicerError::Media(format!(
                "ffprobe failed: {}",
                DiagnosticTail::new(&stderr, self.config.diagnostic_tail_chars)
            )));
        }

        StreamProfile::from_probe_json(&String::from_utf8_lossy(&output.stdout))
    }

    async fn transcode(&self, command: &MediaCommand) -> Result<TranscodeOutcome> {
        debug!("Executing media processing command: {} {}", self.config.ffmpeg_path, command);
        debug!("Description: {}", command.description);

        let Some(output) = self.run(&self.config.ffmpeg_path, &command.args).await? else {
            warn!("{} timed out after {}s", command.description, self.config.timeout_secs);
            return Ok(TranscodeOutcome::Failed {
                exit_status: None,
                diagnostic: DiagnosticTail::new(
                    &format!("timed out after {}s", self.config.timeout_secs),
                    self.config.diagnostic_tail_chars,
                ),
            });
        };

        if output.status.success() {
            return Ok(TranscodeOutcome::Success);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("{} failed: {}", command.description, stderr);
        Ok(TranscodeOutcome::Failed {
            exit_status: output.status.code(),
            diagnostic: DiagnosticTail::new(&stderr, self.config.diagnostic_tail_chars),
        })
    }

    fn check_availability(&self) -> Result<()> {
        for binary in [&self.config.ffmpeg_path, &self.config.ffprobe_path] {
            let output = std::process::Command::new(binary)
                .arg("-version")
                .output()
                .map_err(|e| SplicerError::Media(format!("{} not found: {}", binary, e)))?;

            if !output.status.success() {
                return Err(SplicerError::Media(format!("{} version check failed", binary)));
            }
        }

        info!("Media processor is available");
        Ok(())
    }

    async fn version_info(&self) -> Result<String> {
        let output = self
            .run(&self.config.ffmpeg_path, &["-version".to_string()])
            .await?
            .ok_or_else(|| SplicerError::Media("Version check timed out".to_string()))?;

        if output.status.success() {
            let version_info = String::from_utf8_lossy(&output.stdout);
            let first_line = version_info.lines().next().unwrap_or("Unknown version");
            Ok(first_line.to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(SplicerError::Media(format!("Media processor version check failed: {}", stderr)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(ffmpeg: &str, timeout_secs: u64) -> FfmpegEngine {
        FfmpegEngine::new(MediaConfig {
            ffmpeg_path: ffmpeg.to_string(),
            ffprobe_path: "ffprobe".to_string(),
            timeout_secs,
            diagnostic_tail_chars: 500,
        })
    }

    #[test]
    fn parses_probe_output_with_audio() {
        let json = r#"{
            "programs": [],
            "streams": [{"codec_type": "video"}, {"codec_type": "audio"}],
            "format": {"duration": "12.480000"}
        }"#;
        let profile = StreamProfile::from_probe_json(json).unwrap();
        assert!(profile.has_audio);
        assert!(profile.has_video);
        assert_eq!(profile.duration, Some(12.48));
    }

    #[test]
    fn parses_probe_output_without_audio_or_duration() {
        let profile = StreamProfile::from_probe_json(r#"{"streams": [{"codec_type": "video"}], "format": {}}"#).unwrap();
        assert!(!profile.has_audio);
        assert_eq!(profile.duration, None);

        let empty = StreamProfile::from_probe_json("{}").unwrap();
        assert_eq!(empty, StreamProfile::default());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reports_non_zero_exit_as_failed_outcome() {
        let engine = engine_with("false", 10);
        let outcome = engine.transcode(&MediaCommand::new("always fails")).await.unwrap();
        assert!(matches!(outcome, TranscodeOutcome::Failed { exit_status: Some(1), .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reports_zero_exit_as_success() {
        let engine = engine_with("true", 10);
        let outcome = engine.transcode(&MediaCommand::new("always succeeds")).await.unwrap();
        assert!(outcome.is_success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kills_invocations_that_exceed_the_timeout() {
        let engine = engine_with("sleep", 1);
        let started = std::time::Instant::now();
        let outcome = engine.transcode(&MediaCommand::new("hangs").arg("30")).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        match outcome {
            TranscodeOutcome::Failed { exit_status, diagnostic } => {
                assert_eq!(exit_status, None);
                assert!(diagnostic.as_str().contains("timed out"));
            }
            TranscodeOutcome::Success => panic!("hung invocation reported success"),
        }
    }

    /// Live processes whose command line is exactly `args`. Zombies report an empty cmdline.
    #[cfg(target_os = "linux")]
    fn running(args: &[&str]) -> usize {
        let wanted: Vec<u8> = args.iter().flat_map(|a| a.bytes().chain(std::iter::once(0))).collect();
        std::fs::read_dir("/proc")
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| std::fs::read(e.path().join("cmdline")).is_ok_and(|c| c == wanted))
            .count()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dropping_an_invocation_kills_the_child() {
        let marker = format!("{}.{}", 40 + std::process::id() % 50, std::process::id());
        let argv = ["sleep", marker.as_str()];
        let engine = engine_with("sleep", 600);

        let command = MediaCommand::new("client went away").arg(marker.clone());
        let task = tokio::spawn(async move { engine.transcode(&command).await });

        let mut started = false;
        for _ in 0..100 {
            if running(&argv) == 1 {
                started = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(started, "child never started");

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        let mut gone = false;
        for _ in 0..100 {
            if running(&argv) == 0 {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone, "child outlived its cancelled invocation");
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let engine = engine_with("/nonexistent/ffmpeg-binary", 10);
        tokio_test::assert_err!(engine.transcode(&MediaCommand::new("missing")).await);
    }
}
