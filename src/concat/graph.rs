use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{GraphConfig, ProfileConfig};
use crate::error::{Result, SplicerError};
use crate::media::{DiagnosticTail, Filters, MediaCommand, StreamProfile, TranscodeEngine, TranscodeOutcome};

/// One input of the filter graph with the stream facts needed to wire it
#[derive(Debug, Clone, PartialEq)]
pub struct GraphInput {
    pub path: PathBuf,
    pub profile: StreamProfile,
}

/// Decodes, rescales and merges N inputs in a single encode
#[derive(Clone)]
pub struct GraphConcatenator {
    engine: Arc<dyn TranscodeEngine>,
    profile: ProfileConfig,
    resolution: (u32, u32),
}

impl GraphConcatenator {
    pub fn new(engine: Arc<dyn TranscodeEngine>, profile: ProfileConfig, graph: &GraphConfig) -> Self {
        let resolution = profile.resolution().unwrap_or((graph.width, graph.height));
        Self { engine, profile, resolution }
    }

    /// Build the `-filter_complex` graph for `inputs`.
    ///
    /// Inputs without audio get a silent track trimmed to their duration.
    pub fn build_graph(&self, inputs: &[GraphInput]) -> Result<String> {
        if inputs.is_empty() {
            return Err(SplicerError::Validation("Nothing to concatenate".to_string()));
        }

        let (width, height) = self.resolution;
        let video_chain = format!(
            "{},{}",
            Filters::scale_and_pad(width, height),
            Filters::frame_rate_and_format(self.profile.fps, &self.profile.pixel_format)
        );
        let audio_chain = format!("aresample={},aformat=channel_layouts=stereo", self.profile.sample_rate);

        let mut chains = Vec::with_capacity(inputs.len() * 2 + 1);
        let mut pads = String::new();

        for (i, input) in inputs.iter().enumerate() {
            chains.push(format!("[{i}:v:0]{video_chain}[v{i}]"));

            if input.profile.has_audio {
                chains.push(format!("[{i}:a:0]{audio_chain}[a{i}]"));
            } else {
                let duration = input.profile.duration.ok_or_else(|| SplicerError::Concatenation {
                    diagnostic: DiagnosticTail::new(
                        &format!("input {} has no audio and no known duration", i),
                        usize::MAX,
                    ),
                })?;
                chains.push(format!(
                    "{},atrim=duration={}[a{i}]",
                    Filters::silence(self.profile.sample_rate),
                    duration
                ));
            }

            pads.push_str(&format!("[v{i}][a{i}]"));
        }

        chains.push(format!("{pads}concat=n={}:v=1:a=1[outv][outa]", inputs.len()));
        Ok(chains.join(";"))
    }

    pub fn command(&self, inputs: &[GraphInput], output: &Path) -> Result<MediaCommand> {
        let graph = self.build_graph(inputs)?;

        let cmd = inputs
            .iter()
            .fold(MediaCommand::new("Concatenate videos (filter graph)").overwrite(), |cmd, input| {
                cmd.input(&input.path)
            });

        Ok(cmd
            .filter_complex(graph)
            .map("[outv]")
            .map("[outa]")
            .encode_with(&self.profile)
            .faststart()
            .output(output))
    }

    /// Merge `inputs` into `output`. Failure here is terminal for the request.
    pub async fn concat(&self, inputs: &[GraphInput], output: &Path) -> Result<()> {
        let command = self.command(inputs, output)?;
        info!("Running filter-graph concat of {} files", inputs.len());

        match self.engine.transcode(&command).await? {
            TranscodeOutcome::Success => Ok(()),
            TranscodeOutcome::Failed { exit_status, diagnostic } => {
                error!("Filter-graph concat failed (exit {:?}): {}", exit_status, diagnostic);
                Err(SplicerError::Concatenation { diagnostic })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MockTranscodeEngine;

    fn input(path: &str, has_audio: bool, duration: Option<f64>) -> GraphInput {
        GraphInput {
            path: PathBuf::from(path),
            profile: StreamProfile { has_audio, has_video: true, duration },
        }
    }

    fn concatenator(engine: MockTranscodeEngine) -> GraphConcatenator {
        GraphConcatenator::new(Arc::new(engine), ProfileConfig::default(), &GraphConfig::default())
    }

    #[test]
    fn graph_scales_every_input_and_concats_in_order() {
        let graph = concatenator(MockTranscodeEngine::new())
            .build_graph(&[input("/w/in_0.mp4", true, None), input("/w/in_1.mp4", true, None)])
            .unwrap();

        assert!(graph.starts_with(
            "[0:v:0]scale=1280:720:force_original_aspect_ratio=decrease,pad=1280:720:(ow-iw)/2:(oh-ih)/2,setsar=1,fps=30,format=yuv420p[v0]"
        ));
        assert!(graph.contains("[1:a:0]aresample=44100,aformat=channel_layouts=stereo[a1]"));
        assert!(graph.ends_with("[v0][a0][v1][a1]concat=n=2:v=1:a=1[outv][outa]"));
    }

    #[test]
    fn silent_inputs_get_trimmed_silence() {
        let graph = concatenator(MockTranscodeEngine::new())
            .build_graph(&[input("/w/in_0.mp4", true, None), input("/w/in_1.mp4", false, Some(6.5))])
            .unwrap();

        assert!(graph.contains("anullsrc=channel_layout=stereo:sample_rate=44100,atrim=duration=6.5[a1]"));
        assert!(!graph.contains("[1:a:0]"));
    }

    #[test]
    fn silent_input_without_duration_cannot_be_graphed() {
        let err = concatenator(MockTranscodeEngine::new())
            .build_graph(&[input("/w/in_0.mp4", false, None)])
            .unwrap_err();
        assert!(matches!(err, SplicerError::Concatenation { .. }));
    }

    #[test]
    fn command_maps_graph_outputs_and_encodes_once() {
        let cmd = concatenator(MockTranscodeEngine::new())
            .command(
                &[input("/w/prep_0.mp4", true, None), input("/w/prep_1.mp4", true, None)],
                Path::new("/w/out.partial.mp4"),
            )
            .unwrap();

        let joined = cmd.to_string();
        assert!(joined.starts_with("-y -i /w/prep_0.mp4 -i /w/prep_1.mp4 -filter_complex "));
        assert!(joined.contains("-map [outv] -map [outa] -c:v libx264"));
        assert!(joined.ends_with("/w/out.partial.mp4"));
    }

    #[tokio::test]
    async fn engine_failure_is_a_concatenation_error() {
        let mut engine = MockTranscodeEngine::new();
        engine.expect_transcode().times(1).returning(|_| {
            Ok(TranscodeOutcome::Failed {
                exit_status: Some(1),
                diagnostic: DiagnosticTail::new("Error reinitializing filters!", 500),
            })
        });

        let err = concatenator(engine)
            .concat(&[input("/w/in_0.mp4", true, None)], Path::new("/w/out.partial.mp4"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Concat failed: Error reinitializing filters!");
    }
}
