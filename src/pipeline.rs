//! Concatenation pipeline.
//!
//! Requests move through an explicit ladder of stages, cheapest strategy
//! first:
//!
//! ```text
//! Fetching -> AttemptFast -> AttemptNormalizedFast -> AttemptGraph -> Done
//!     \            (ok)\              (ok)\                 \
//!      +-> Failed       +-> Done           +-> Done          +-> Failed
//! ```
//!
//! Intermediate strategy failures only move the request up the ladder. A
//! download failure, a normalization failure or a failed final strategy ends
//! it in `Failed`.

use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{error, info, warn};

use crate::concat::{ConcatManifest, FastConcatenator, FastOutcome, GraphConcatenator, GraphInput};
use crate::config::{Config, FetchConfig, PipelineConfig};
use crate::error::{Result, SplicerError};
use crate::fetch::{infer_extension, Fetcher};
use crate::media::{StreamProfile, TranscodeEngine};
use crate::normalize::{NormalizedFile, Normalizer};
use crate::probe::StreamProbe;
use crate::store::{Artifact, ArtifactStore, WorkingSet};

/// Inbound "concatenate" request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcatRequest {
    #[serde(default)]
    pub urls: Vec<String>,
}

/// The strategy that produced an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Fast,
    NormalizedFast,
    Graph,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Fast => write!(f, "fast"),
            Strategy::NormalizedFast => write!(f, "normalized_fast"),
            Strategy::Graph => write!(f, "graph"),
        }
    }
}

/// Stage names as recorded in a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Fetching,
    AttemptFast,
    AttemptNormalizedFast,
    AttemptGraph,
    Done,
    Failed,
}

enum Stage {
    Fetching,
    AttemptFast,
    AttemptNormalizedFast,
    AttemptGraph(Vec<GraphInput>),
    Done { artifact: Artifact, strategy: Strategy },
    Failed(SplicerError),
}

impl Stage {
    fn name(&self) -> StageName {
        match self {
            Stage::Fetching => StageName::Fetching,
            Stage::AttemptFast => StageName::AttemptFast,
            Stage::AttemptNormalizedFast => StageName::AttemptNormalizedFast,
            Stage::AttemptGraph(_) => StageName::AttemptGraph,
            Stage::Done { .. } => StageName::Done,
            Stage::Failed(_) => StageName::Failed,
        }
    }
}

/// A downloaded source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub ordinal: usize,
    pub path: PathBuf,
    pub size: u64,
    pub extension: String,
}

/// Summary of a completed request
#[derive(Debug, Clone, Serialize)]
pub struct ConcatReport {
    pub token: String,
    pub artifact_path: PathBuf,
    pub strategy: Strategy,
    pub stages: Vec<StageName>,
    pub sources: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Drives one request from URLs to a published artifact
pub struct ConcatOrchestrator {
    fetch_config: FetchConfig,
    pipeline_config: PipelineConfig,
    store: ArtifactStore,
    fetcher: Arc<dyn Fetcher>,
    probe: StreamProbe,
    normalizer: Normalizer,
    fast: FastConcatenator,
    graph: GraphConcatenator,
}

impl ConcatOrchestrator {
    pub fn new(
        config: &Config,
        store: ArtifactStore,
        engine: Arc<dyn TranscodeEngine>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            fetch_config: config.fetch.clone(),
            pipeline_config: config.pipeline.clone(),
            store,
            fetcher,
            probe: StreamProbe::new(engine.clone()),
            normalizer: Normalizer::new(engine.clone(), config.profile.clone()),
            fast: FastConcatenator::new(engine.clone()),
            graph: GraphConcatenator::new(engine, config.profile.clone(), &config.graph),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Reject empty requests and truncate oversized ones
    pub fn prepare_urls(&self, mut urls: Vec<String>) -> Result<Vec<String>> {
        if urls.is_empty() {
            return Err(SplicerError::Validation("No URLs provided".to_string()));
        }
        if urls.len() > self.fetch_config.max_urls {
            warn!("Request has {} URLs, keeping the first {}", urls.len(), self.fetch_config.max_urls);
            urls.truncate(self.fetch_config.max_urls);
        }
        Ok(urls)
    }

    /// Run the full ladder for `urls`.
    ///
    /// Dropping the returned future cancels the request and kills any
    /// running engine invocation.
    pub async fn run(&self, urls: Vec<String>) -> Result<ConcatReport> {
        let urls = self.prepare_urls(urls)?;
        let started_at = Utc::now();
        let ws = self.store.allocate().await?;
        info!("Request {} started with {} sources", ws.token(), urls.len());

        let mut sources: Vec<SourceFile> = Vec::new();
        let mut stages = Vec::new();
        let mut stage = Stage::Fetching;

        loop {
            stages.push(stage.name());
            info!("Request {} entering {:?}", ws.token(), stage.name());

            stage = match stage {
                Stage::Fetching => match self.fetch_all(&ws, &urls).await {
                    Ok(fetched) => {
                        sources = fetched;
                        Stage::AttemptFast
                    }
                    Err(e) => Stage::Failed(e),
                },
                Stage::AttemptFast => self.attempt_fast(&ws, &sources).await,
                Stage::AttemptNormalizedFast => self.attempt_normalized_fast(&ws, &sources).await,
                Stage::AttemptGraph(inputs) => self.attempt_graph(&ws, &inputs).await,
                Stage::Done { artifact, strategy } => {
                    let report = ConcatReport {
                        token: artifact.token,
                        artifact_path: artifact.path,
                        strategy,
                        stages,
                        sources: sources.len(),
                        started_at,
                        finished_at: Utc::now(),
                    };
                    info!(
                        "Request {} done via {} in {}ms",
                        report.token,
                        strategy,
                        (report.finished_at - report.started_at).num_milliseconds()
                    );
                    return Ok(report);
                }
                Stage::Failed(err) => {
                    self.store.discard_staging(&ws).await;
                    error!("Request {} failed: {}", ws.token(), err);
                    return Err(err);
                }
            };
        }
    }

    async fn fetch_all(&self, ws: &WorkingSet, urls: &[String]) -> Result<Vec<SourceFile>> {
        let downloads: Vec<_> = urls
            .iter()
            .enumerate()
            .map(|(ordinal, url)| self.fetch_one(ws, ordinal, url))
            .collect();

        futures::stream::iter(downloads)
            .buffered(self.fetch_config.max_concurrent)
            .try_collect()
            .await
    }

    async fn fetch_one(&self, ws: &WorkingSet, ordinal: usize, url: &str) -> Result<SourceFile> {
        let extension = infer_extension(url);
        let path = ws.source_path(ordinal, &extension);
        let timeout = Duration::from_secs(self.fetch_config.timeout_secs);

        self.fetcher
            .fetch(url, &path, timeout)
            .await
            .map_err(|e| e.at(ordinal))?;

        let size = fs::metadata(&path)
            .await
            .map_err(|e| SplicerError::Download {
                ordinal,
                reason: format!("downloaded file unreadable: {}", e),
            })?
            .len();
        info!("Downloaded video {}: {}, size: {} bytes", ordinal, path.display(), size);

        if size < self.fetch_config.min_file_bytes {
            return Err(SplicerError::Undersized {
                ordinal,
                size,
                min: self.fetch_config.min_file_bytes,
            });
        }

        Ok(SourceFile { ordinal, path, size, extension })
    }

    async fn attempt_fast(&self, ws: &WorkingSet, sources: &[SourceFile]) -> Stage {
        let manifest = match ConcatManifest::new(sources.iter().map(|s| &s.path)) {
            Ok(manifest) => manifest,
            Err(e) => return Stage::Failed(e),
        };

        match self.fast.concat(&manifest, &ws.manifest_path("raw"), &ws.staging_path()).await {
            Ok(FastOutcome::Merged) => self.finish(ws, Strategy::Fast).await,
            Ok(FastOutcome::Rejected { .. }) => {
                info!("Sources are not copy-compatible, normalizing");
                self.store.discard_staging(ws).await;
                Stage::AttemptNormalizedFast
            }
            Err(e) => Stage::Failed(e),
        }
    }

    async fn attempt_normalized_fast(&self, ws: &WorkingSet, sources: &[SourceFile]) -> Stage {
        let normalized = match self.normalize_all(ws, sources).await {
            Ok(normalized) => normalized,
            Err(e) => return Stage::Failed(e),
        };

        let manifest = match ConcatManifest::new(normalized.iter().map(|n| &n.path)) {
            Ok(manifest) => manifest,
            Err(e) => return Stage::Failed(e),
        };

        match self.fast.concat(&manifest, &ws.manifest_path("normalized"), &ws.staging_path()).await {
            Ok(FastOutcome::Merged) => self.finish(ws, Strategy::NormalizedFast).await,
            Ok(FastOutcome::Rejected { .. }) => {
                warn!("Copy-merge of normalized files failed, falling back to filter graph");
                self.store.discard_staging(ws).await;
                Stage::AttemptGraph(
                    normalized
                        .into_iter()
                        .map(|n| GraphInput {
                            path: n.path,
                            profile: StreamProfile {
                                has_audio: true,
                                has_video: true,
                                duration: None,
                            },
                        })
                        .collect(),
                )
            }
            Err(e) => Stage::Failed(e),
        }
    }

    async fn attempt_graph(&self, ws: &WorkingSet, inputs: &[GraphInput]) -> Stage {
        match self.graph.concat(inputs, &ws.staging_path()).await {
            Ok(()) => self.finish(ws, Strategy::Graph).await,
            Err(e) => Stage::Failed(e),
        }
    }

    /// Probe and normalize every source; the merge waits for all of them
    async fn normalize_all(&self, ws: &WorkingSet, sources: &[SourceFile]) -> Result<Vec<NormalizedFile>> {
        let jobs: Vec<_> = sources.iter().map(|source| self.normalize_one(ws, source)).collect();

        futures::stream::iter(jobs)
            .buffered(self.pipeline_config.max_concurrent_normalize)
            .try_collect()
            .await
    }

    async fn normalize_one(&self, ws: &WorkingSet, source: &SourceFile) -> Result<NormalizedFile> {
        let profile = self.probe.profile(&source.path).await;
        self.normalizer
            .normalize(source.ordinal, &source.path, &profile, &ws.normalized_path(source.ordinal))
            .await
    }

    async fn finish(&self, ws: &WorkingSet, strategy: Strategy) -> Stage {
        match self.store.publish(ws).await {
            Ok(artifact) => Stage::Done { artifact, strategy },
            Err(e) => Stage::Failed(e),
        }
    }
}
