use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::Result;
use crate::media::{DiagnosticTail, MediaCommand, TranscodeEngine, TranscodeOutcome};
use super::ConcatManifest;

/// Result of a stream-copy merge attempt. A rejection is expected, not exceptional.
#[derive(Debug, Clone, PartialEq)]
pub enum FastOutcome {
    Merged,
    Rejected {
        exit_status: Option<i32>,
        diagnostic: DiagnosticTail,
    },
}

/// Merges already-compatible files without re-encoding
#[derive(Clone)]
pub struct FastConcatenator {
    engine: Arc<dyn TranscodeEngine>,
}

impl FastConcatenator {
    pub fn new(engine: Arc<dyn TranscodeEngine>) -> Self {
        Self { engine }
    }

    pub fn command(list_path: &Path, output: &Path) -> MediaCommand {
        MediaCommand::new("Concatenate videos (stream copy)")
            .overwrite()
            .concat_list_input(list_path)
            .copy_streams()
            .faststart()
            .output(output)
    }

    /// Write `manifest` to `list_path` and copy-merge it into `output`
    pub async fn concat(&self, manifest: &ConcatManifest, list_path: &Path, output: &Path) -> Result<FastOutcome> {
        manifest.write_to(list_path).await?;
        info!("Running stream-copy concat of {} files", manifest.len());

        match self.engine.transcode(&Self::command(list_path, output)).await? {
            TranscodeOutcome::Success => Ok(FastOutcome::Merged),
            TranscodeOutcome::Failed { exit_status, diagnostic } => {
                warn!("Stream-copy concat rejected (exit {:?}): {}", exit_status, diagnostic);
                Ok(FastOutcome::Rejected { exit_status, diagnostic })
            }
        }
    }
}
