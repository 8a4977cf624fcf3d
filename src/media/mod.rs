// Transcoding engine abstraction
//
// Everything that touches ffmpeg/ffprobe goes through the `TranscodeEngine`
// capability so the pipeline can be driven by a test double:
// - Commands: engine-agnostic argument builders and filter fragments
// - Processor: the ffmpeg/ffprobe subprocess implementation

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub use commands::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;

/// Stream facts of one media file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamProfile {
    pub has_audio: bool,
    pub has_video: bool,
    /// Container duration in seconds, when the engine reports one
    pub duration: Option<f64>,
}

/// Bounded excerpt from the end of an engine's diagnostic output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticTail(String);

impl DiagnosticTail {
    /// Keep at most `max_chars` characters from the end of `text`
    pub fn new(text: &str, max_chars: usize) -> Self {
        let text = text.trim_end();
        let count = text.chars().count();
        if count <= max_chars {
            return Self(text.to_string());
        }
        Self(text.chars().skip(count - max_chars).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DiagnosticTail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of one engine invocation that managed to run.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeOutcome {
    Success,
    /// Non-zero exit, or killed after the invocation timeout (`exit_status` is `None`)
    Failed {
        exit_status: Option<i32>,
        diagnostic: DiagnosticTail,
    },
}

impl TranscodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TranscodeOutcome::Success)
    }
}

/// Capability interface over the external transcoding engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    /// Inspect a media file. Fails only when the inspection itself cannot run.
    async fn probe(&self, path: &Path) -> Result<StreamProfile>;

    /// Run a transcode/merge command to completion.
    ///
    /// `Err` means the engine could not be invoked at all; a command the
    /// engine rejects is an ordinary `TranscodeOutcome::Failed`.
    async fn transcode(&self, command: &MediaCommand) -> Result<TranscodeOutcome>;

    /// Check that the engine binaries are available
    fn check_availability(&self) -> Result<()>;

    /// First line of the engine's version banner
    async fn version_info(&self) -> Result<String>;
}

/// Factory for creating engine instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the default engine implementation (ffmpeg-based)
    pub fn create_engine(config: MediaConfig) -> Arc<dyn TranscodeEngine> {
        Arc::new(processor::FfmpegEngine::new(config))
    }
}
