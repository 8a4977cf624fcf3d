use thiserror::Error;

use crate::media::DiagnosticTail;

#[derive(Error, Debug)]
pub enum SplicerError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Failed to download video {ordinal}: {reason}")]
    Download { ordinal: usize, reason: String },

    #[error("Video {ordinal} too small ({size} bytes, minimum {min}), likely download failed")]
    Undersized { ordinal: usize, size: u64, min: u64 },

    #[error("Failed to preprocess video {ordinal}: {diagnostic}")]
    Normalization {
        ordinal: usize,
        diagnostic: DiagnosticTail,
    },

    #[error("Concat failed: {diagnostic}")]
    Concatenation { diagnostic: DiagnosticTail },

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SplicerError {
    /// HTTP status the inbound API answers with for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            SplicerError::Validation(_)
            | SplicerError::Download { .. }
            | SplicerError::Undersized { .. } => 400,
            _ => 500,
        }
    }

    /// Ordinal of the source the failure is attributed to, if any.
    pub fn ordinal(&self) -> Option<usize> {
        match self {
            SplicerError::Download { ordinal, .. }
            | SplicerError::Undersized { ordinal, .. }
            | SplicerError::Normalization { ordinal, .. } => Some(*ordinal),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SplicerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_side_failures_map_to_bad_request() {
        assert_eq!(SplicerError::Validation("No URLs provided".into()).status_code(), 400);
        let err = SplicerError::Undersized { ordinal: 3, size: 500, min: 1000 };
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.ordinal(), Some(3));
        assert!(err.to_string().contains("Video 3 too small (500 bytes"));
    }

    #[test]
    fn engine_failures_map_to_server_error() {
        let err = SplicerError::Concatenation {
            diagnostic: DiagnosticTail::new("Invalid data found when processing input", 500),
        };
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.ordinal(), None);
        assert_eq!(err.to_string(), "Concat failed: Invalid data found when processing input");
    }
}
