use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ProfileConfig;
use crate::error::{Result, SplicerError};
use crate::media::{Filters, MediaCommand, StreamProfile, TranscodeEngine, TranscodeOutcome};

/// How the output's single audio stream is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioPlan {
    /// Re-encode the source's first audio stream
    SourceAudio,
    /// Re-encode the source and let the engine pick its streams
    SourceUnmapped,
    /// Synthesize silence and map streams explicitly
    SilentMapped,
    /// Synthesize silence and let the engine pick streams
    SilentUnmapped,
}

impl AudioPlan {
    /// First plan to try for a source
    pub fn initial(profile: &StreamProfile) -> Self {
        if profile.has_audio {
            AudioPlan::SourceAudio
        } else {
            AudioPlan::SilentMapped
        }
    }

    /// Whether the output audio is synthesized rather than taken from the source
    pub fn is_silent(self) -> bool {
        matches!(self, AudioPlan::SilentMapped | AudioPlan::SilentUnmapped)
    }

    /// The one alternate mapping tried after the initial plan fails.
    /// A source's own audio is never traded for silence.
    pub fn fallback(self) -> Option<Self> {
        match self {
            AudioPlan::SourceAudio => Some(AudioPlan::SourceUnmapped),
            AudioPlan::SilentMapped => Some(AudioPlan::SilentUnmapped),
            AudioPlan::SourceUnmapped | AudioPlan::SilentUnmapped => None,
        }
    }
}

/// A source rewritten to the canonical profile
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFile {
    pub ordinal: usize,
    pub path: PathBuf,
    pub plan: AudioPlan,
}

/// Rewrites sources into the canonical profile
#[derive(Clone)]
pub struct Normalizer {
    engine: Arc<dyn TranscodeEngine>,
    profile: ProfileConfig,
}

impl Normalizer {
    pub fn new(engine: Arc<dyn TranscodeEngine>, profile: ProfileConfig) -> Self {
        Self { engine, profile }
    }

    /// Build the engine command for one audio plan
    pub fn command(&self, source: &Path, output: &Path, plan: AudioPlan) -> MediaCommand {
        let mut cmd = MediaCommand::new(format!("Normalize {} ({:?})", source.display(), plan))
            .overwrite()
            .input(source);

        if plan.is_silent() {
            cmd = cmd.lavfi_input(Filters::silence(self.profile.sample_rate));
        }

        cmd = cmd
            .video_filter(Filters::canonical_video(&self.profile))
            .encode_with(&self.profile);

        cmd = match plan {
            AudioPlan::SourceAudio => cmd.map("0:v:0").map("0:a:0"),
            AudioPlan::SourceUnmapped => cmd,
            AudioPlan::SilentMapped => cmd.map("0:v:0").map("1:a:0").shortest(),
            AudioPlan::SilentUnmapped => cmd.shortest(),
        };

        cmd.output(output)
    }

    /// Normalize source `ordinal` into `output`, retrying once with the alternate audio plan
    pub async fn normalize(
        &self,
        ordinal: usize,
        source: &Path,
        profile: &StreamProfile,
        output: &Path,
    ) -> Result<NormalizedFile> {
        let mut plan = AudioPlan::initial(profile);
        info!("Preprocessing video {} with {:?}", ordinal, plan);

        let diagnostic = match self.engine.transcode(&self.command(source, output, plan)).await? {
            TranscodeOutcome::Success => return Ok(self.normalized(ordinal, output, plan)),
            TranscodeOutcome::Failed { diagnostic, .. } => diagnostic,
        };

        let Some(retry) = plan.fallback() else {
            return Err(SplicerError::Normalization { ordinal, diagnostic });
        };
        warn!("Preprocessing video {} with {:?} failed, retrying with {:?}: {}", ordinal, plan, retry, diagnostic);
        plan = retry;

        match self.engine.transcode(&self.command(source, output, plan)).await? {
            TranscodeOutcome::Success => Ok(self.normalized(ordinal, output, plan)),
            TranscodeOutcome::Failed { diagnostic, .. } => Err(SplicerError::Normalization { ordinal, diagnostic }),
        }
    }

    fn normalized(&self, ordinal: usize, output: &Path, plan: AudioPlan) -> NormalizedFile {
        NormalizedFile {
            ordinal,
            path: output.to_path_buf(),
            plan,
        }
    }
}
