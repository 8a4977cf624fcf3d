use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{Result, SplicerError};

/// Ordered list of files to merge, in playback order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatManifest {
    entries: Vec<PathBuf>,
}

impl ConcatManifest {
    /// Build a manifest; relative paths are made absolute against the current directory
    pub fn new<I, P>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let entries = paths
            .into_iter()
            .map(|p| std::path::absolute(p.as_ref()))
            .collect::<std::io::Result<Vec<_>>>()?;

        if entries.is_empty() {
            return Err(SplicerError::Validation("Nothing to concatenate".to_string()));
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render in concat demuxer syntax, one `file '...'` directive per line
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', r"'\''")))
            .collect()
    }

    pub async fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render()).await?;
        Ok(())
    }
}
