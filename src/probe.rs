use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::media::TranscodeEngine;

pub use crate::media::StreamProfile;

/// Answers "what streams does this file carry" for the pipeline.
#[derive(Clone)]
pub struct StreamProbe {
    engine: Arc<dyn TranscodeEngine>,
}

impl StreamProbe {
    pub fn new(engine: Arc<dyn TranscodeEngine>) -> Self {
        Self { engine }
    }

    /// Probe `path`. An inspection failure is reported as a file without
    /// audio so a silent track gets added instead of aborting the request.
    pub async fn profile(&self, path: &Path) -> StreamProfile {
        match self.engine.probe(path).await {
            Ok(profile) => {
                info!("{} has audio: {}", path.display(), profile.has_audio);
                profile
            }
            Err(e) => {
                warn!("Probe failed for {}, assuming no audio: {}", path.display(), e);
                StreamProfile {
                    has_audio: false,
                    has_video: true,
                    duration: None,
                }
            }
        }
    }

    pub async fn has_audio(&self, path: &Path) -> bool {
        self.profile(path).await.has_audio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SplicerError;
    use crate::media::MockTranscodeEngine;

    #[tokio::test]
    async fn passes_through_engine_profile() {
        let mut engine = MockTranscodeEngine::new();
        engine.expect_probe().times(1).returning(|_| {
            Ok(StreamProfile {
                has_audio: true,
                has_video: true,
                duration: Some(4.0),
            })
        });

        let probe = StreamProbe::new(Arc::new(engine));
        assert!(probe.has_audio(Path::new("/work/in_0.mp4")).await);
    }

    #[tokio::test]
    async fn engine_failure_means_no_audio() {
        let mut engine = MockTranscodeEngine::new();
        engine
            .expect_probe()
            .returning(|_| Err(SplicerError::Media("ffprobe failed: moov atom not found".to_string())));

        let probe = StreamProbe::new(Arc::new(engine));
        let profile = probe.profile(Path::new("/work/in_1.mp4")).await;
        assert!(!profile.has_audio);
        assert_eq!(profile.duration, None);
    }
}
