use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{Result, SplicerError};

/// Name of the one file exposed per working set
pub const ARTIFACT_NAME: &str = "out.mp4";
/// Every strategy writes here; only a successful one is renamed to `ARTIFACT_NAME`
pub const STAGING_NAME: &str = "out.partial.mp4";

/// Request-scoped directory holding every intermediate and final file.
#[derive(Debug, Clone)]
pub struct WorkingSet {
    token: String,
    dir: PathBuf,
}

impl WorkingSet {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn source_path(&self, ordinal: usize, extension: &str) -> PathBuf {
        self.dir.join(format!("in_{}.{}", ordinal, extension))
    }

    pub fn normalized_path(&self, ordinal: usize) -> PathBuf {
        self.dir.join(format!("prep_{}.mp4", ordinal))
    }

    pub fn manifest_path(&self, label: &str) -> PathBuf {
        self.dir.join(format!("list_{}.txt", label))
    }

    pub fn staging_path(&self) -> PathBuf {
        self.dir.join(STAGING_NAME)
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.dir.join(ARTIFACT_NAME)
    }
}

/// The published output of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub token: String,
    pub path: PathBuf,
}

/// Allocates working sets under an explicit storage root and publishes artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, never-reused working set
    pub async fn allocate(&self) -> Result<WorkingSet> {
        let token = Uuid::new_v4().simple().to_string();
        let dir = self.root.join(&token);

        // create_dir (not create_dir_all) so a collision fails instead of sharing a directory
        fs::create_dir(&dir).await?;
        debug!("Allocated working set {}", dir.display());

        Ok(WorkingSet { token, dir })
    }

    /// Promote the staging output of `ws` to its artifact
    pub async fn publish(&self, ws: &WorkingSet) -> Result<Artifact> {
        let staging = ws.staging_path();
        let artifact = ws.artifact_path();
        fs::rename(&staging, &artifact).await.map_err(|e| {
            SplicerError::Media(format!("Failed to publish {}: {}", staging.display(), e))
        })?;

        info!("Published artifact {}", artifact.display());
        Ok(Artifact {
            token: ws.token.clone(),
            path: artifact,
        })
    }

    /// Remove a leftover staging file from a failed strategy
    pub async fn discard_staging(&self, ws: &WorkingSet) {
        match fs::remove_file(ws.staging_path()).await {
            Ok(()) => debug!("Discarded staging output in {}", ws.dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove staging output in {}: {}", ws.dir.display(), e),
        }
    }

    /// Address under which `token`'s artifact is served
    pub fn external_address(&self, base_url: &str, token: &str) -> String {
        format!("{}/files/{}/{}", base_url.trim_end_matches('/'), token, ARTIFACT_NAME)
    }

    /// Map an externally supplied token and filename to a published artifact.
    ///
    /// Only well-formed tokens and the artifact filename are accepted, so
    /// neither traversal nor intermediate files are reachable.
    pub fn resolve(&self, token: &str, filename: &str) -> Option<PathBuf> {
        if !is_valid_token(token) || filename != ARTIFACT_NAME {
            return None;
        }
        let path = self.root.join(token).join(ARTIFACT_NAME);
        path.is_file().then_some(path)
    }

    /// Delete working sets with no file activity for longer than `ttl`.
    ///
    /// Activity is the newest modification time of the directory or anything
    /// inside it, so a set whose engine is still writing is never removed.
    pub fn sweep_expired(&self, ttl: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let name = entry.file_name().to_string_lossy();
            if !entry.file_type().is_dir() || !is_valid_token(&name) {
                continue;
            }

            let expired = last_activity(entry.path())
                .and_then(|m| now.duration_since(m).ok())
                .is_some_and(|age| age > ttl);

            if expired {
                match std::fs::remove_dir_all(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to remove {}: {}", entry.path().display(), e),
                }
            }
        }

        if removed > 0 {
            info!("Removed {} expired working sets", removed);
        }
        Ok(removed)
    }
}

fn last_activity(dir: &Path) -> Option<SystemTime> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.metadata().ok()?.modified().ok())
        .max()
}

fn is_valid_token(token: &str) -> bool {
    token.len() == 32 && token.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}
