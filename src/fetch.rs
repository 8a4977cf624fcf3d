use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::FetchConfig;
use crate::error::{Result, SplicerError};

const DEFAULT_EXTENSION: &str = "mp4";

/// Why a single download failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadError(pub String);

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl DownloadError {
    /// Attach the ordinal of the failing source
    pub fn at(self, ordinal: usize) -> SplicerError {
        SplicerError::Download { ordinal, reason: self.0 }
    }
}

/// Download collaborator: materializes one URL at a local path
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieve `url` fully into `dest`, returning the number of bytes written
    async fn fetch(&self, url: &str, dest: &Path, timeout: Duration) -> std::result::Result<u64, DownloadError>;
}

/// Streaming HTTP fetcher
pub struct HttpFetcher {
    client: Client,
    max_bytes: Option<u64>,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(SplicerError::Http)?;

        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    async fn download(&self, url: &str, dest: &Path) -> std::result::Result<u64, DownloadError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DownloadError(format!("HTTP {}", response.status())));
        }

        let mut file = fs::File::create(dest)
            .await
            .map_err(|e| DownloadError(format!("cannot create {}: {}", dest.display(), e)))?;

        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| DownloadError(format!("transfer interrupted: {}", e)))?
        {
            written += chunk.len() as u64;
            if let Some(max) = self.max_bytes {
                if written > max {
                    return Err(DownloadError(format!("payload exceeds {} bytes", max)));
                }
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError(format!("write failed: {}", e)))?;
        }

        file.flush()
            .await
            .map_err(|e| DownloadError(format!("write failed: {}", e)))?;

        Ok(written)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path, timeout: Duration) -> std::result::Result<u64, DownloadError> {
        debug!("Downloading {} -> {}", url, dest.display());

        let written = tokio::time::timeout(timeout, self.download(url, dest))
            .await
            .map_err(|_| DownloadError(format!("timed out after {}s", timeout.as_secs())))??;

        info!("Downloaded {} ({} bytes)", dest.display(), written);
        Ok(written)
    }
}

/// Guess a file extension from the last path segment of `url`.
///
/// A suffix of one to four ASCII alphanumerics is kept (lowercased);
/// anything else falls back to `mp4`.
pub fn infer_extension(url: &str) -> String {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    path.rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| (1..5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};

    #[test]
    fn infers_short_extensions() {
        assert_eq!(infer_extension("https://cdn.example.com/clips/intro.webm"), "webm");
        assert_eq!(infer_extension("https://cdn.example.com/a/b/clip.MOV?sig=abc.def"), "mov");
        assert_eq!(infer_extension("https://cdn.example.com/video.mp4#t=10"), "mp4");
    }

    #[test]
    fn falls_back_to_mp4() {
        assert_eq!(infer_extension("https://cdn.example.com/watch"), "mp4");
        assert_eq!(infer_extension("https://cdn.example.com/archive.backup"), "mp4");
        assert_eq!(infer_extension("https://cdn.example.com/v1.2/stream"), "mp4");
        assert_eq!(infer_extension("https://cdn.example.com/clip.m-4"), "mp4");
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn streams_body_to_disk() {
        let base = serve(Router::new().route("/clip.mp4", get(|| async { vec![7u8; 4096] }))).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("in_0.mp4");

        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let written = fetcher
            .fetch(&format!("{}/clip.mp4", base), &dest, Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(written, 4096);
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn non_success_status_is_a_download_error() {
        let base = serve(Router::new().route("/gone.mp4", get(|| async { StatusCode::NOT_FOUND }))).await;
        let dir = tempfile::tempdir().unwrap();

        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let err = fetcher
            .fetch(&format!("{}/gone.mp4", base), &dir.path().join("in_0.mp4"), Duration::from_secs(10))
            .await
            .unwrap_err();

        assert!(err.0.contains("404"));
        assert!(matches!(err.at(2), SplicerError::Download { ordinal: 2, .. }));
    }

    #[tokio::test]
    async fn enforces_size_cap() {
        let base = serve(Router::new().route("/big.mp4", get(|| async { vec![0u8; 8192] }))).await;
        let dir = tempfile::tempdir().unwrap();
        let config = FetchConfig {
            max_bytes: Some(1024),
            ..FetchConfig::default()
        };

        let fetcher = HttpFetcher::new(&config).unwrap();
        let err = fetcher
            .fetch(&format!("{}/big.mp4", base), &dir.path().join("in_0.mp4"), Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(err.0.contains("exceeds 1024 bytes"));
    }

    #[tokio::test]
    async fn times_out_slow_servers() {
        let base = serve(Router::new().route(
            "/slow.mp4",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        ))
        .await;
        let dir = tempfile::tempdir().unwrap();

        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let err = fetcher
            .fetch(&format!("{}/slow.mp4", base), &dir.path().join("in_0.mp4"), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.0.contains("timed out"));
    }
}
