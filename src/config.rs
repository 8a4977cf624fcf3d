use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, SplicerError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub fetch: FetchConfig,
    pub media: MediaConfig,
    pub profile: ProfileConfig,
    pub graph: GraphConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the HTTP service listens on
    pub bind: String,
    /// Externally reachable base URL used when building artifact addresses.
    /// When unset, the request's Host header is used.
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one working set per request
    pub root: PathBuf,
    /// Working sets older than this are removed by the sweeper (0 disables)
    pub retention_secs: u64,
    /// How often the server runs the retention sweep
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-download timeout
    pub timeout_secs: u64,
    /// Requests longer than this are truncated
    pub max_urls: usize,
    /// Downloads smaller than this are treated as failed
    pub min_file_bytes: u64,
    /// Maximum concurrent downloads within one request
    pub max_concurrent: usize,
    /// Optional cap on a single download's size
    pub max_bytes: Option<u64>,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub ffmpeg_path: String,
    /// Path to ffprobe binary
    pub ffprobe_path: String,
    /// Upper bound for a single engine invocation
    pub timeout_secs: u64,
    /// Maximum characters of engine stderr carried in errors
    pub diagnostic_tail_chars: usize,
}

/// Canonical profile every normalized file is forced into.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub fps: u32,
    pub pixel_format: String,
    /// Fixed output width; scale-and-pad is applied only when both width and height are set
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub video_codec: String,
    /// Encoding speed (ultrafast, fast, medium, slow, veryslow)
    pub preset: String,
    /// Quality (0-51, lower = better quality)
    pub crf: u32,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub sample_rate: u32,
    pub channels: u32,
}

/// Common resolution for the single-pass filter graph when the profile has none.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum concurrent normalizations within one request
    pub max_concurrent_normalize: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            public_url: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/tmp/video_concat_files"),
            retention_secs: 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 180,
            max_urls: 50,
            min_file_bytes: 1000,
            max_concurrent: 4,
            max_bytes: None,
            user_agent: format!("splicer/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            timeout_secs: 30 * 60,
            diagnostic_tail_chars: 500,
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            pixel_format: "yuv420p".to_string(),
            width: None,
            height: None,
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 18,
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            sample_rate: 44100,
            channels: 2,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self { width: 1280, height: 720 }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { max_concurrent_normalize: 2 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from(".splicer/log") }
    }
}

impl ProfileConfig {
    /// Fixed output resolution, if one is configured.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SplicerError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| SplicerError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SplicerError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SplicerError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Apply the `PORT` environment variable to the bind address.
    pub fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse::<u16>() {
                let host = self
                    .server
                    .bind
                    .rsplit_once(':')
                    .map(|(host, _)| host.to_string())
                    .unwrap_or_else(|| "0.0.0.0".to_string());
                self.server.bind = format!("{}:{}", host, port);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.max_urls == 0 {
            return Err(SplicerError::Config("fetch.max_urls must be at least 1".to_string()));
        }
        if self.fetch.max_concurrent == 0 || self.pipeline.max_concurrent_normalize == 0 {
            return Err(SplicerError::Config("concurrency limits must be at least 1".to_string()));
        }
        if self.fetch.timeout_secs == 0 || self.media.timeout_secs == 0 {
            return Err(SplicerError::Config("timeouts must be non-zero".to_string()));
        }
        if self.profile.fps == 0 || self.profile.sample_rate == 0 || self.profile.channels == 0 {
            return Err(SplicerError::Config("profile fps, sample_rate and channels must be non-zero".to_string()));
        }
        if self.storage.retention_secs != 0 && self.storage.retention_secs <= self.media.timeout_secs {
            return Err(SplicerError::Config(
                "storage.retention_secs must exceed media.timeout_secs (or be 0 to disable the sweep)".to_string(),
            ));
        }
        if self.profile.width.is_some() != self.profile.height.is_some() {
            return Err(SplicerError::Config("profile width and height must be set together".to_string()));
        }
        Ok(())
    }
}
