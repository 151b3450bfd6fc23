use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::frame::Frame;

/// Image encoding used for persisted captures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    #[default]
    Jpg,
    Png,
}

impl CaptureFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
        }
    }
}

impl std::str::FromStr for CaptureFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "png" => Ok(Self::Png),
            other => Err(format!("unknown capture format '{other}' (expected jpg or png)")),
        }
    }
}

/// A snapshot chosen for persistence, stamped when the smile began.
#[derive(Clone, Debug)]
pub struct CaptureEvent {
    pub snapshot: Frame,
    pub timestamp: DateTime<Local>,
}

impl CaptureEvent {
    pub fn new(snapshot: Frame, timestamp: DateTime<Local>) -> Self {
        Self {
            snapshot,
            timestamp,
        }
    }

    pub fn now(snapshot: Frame) -> Self {
        Self::new(snapshot, Local::now())
    }
}

/// Identifies a persisted capture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureId {
    /// File stem, e.g. `smile_20240131_142501` or `smile_20240131_142501_1`.
    pub name: String,
    pub path: PathBuf,
}

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.path.file_name() {
            Some(file) => write!(f, "{}", file.to_string_lossy()),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("snapshot is not a valid RGB image: {0}")]
    InvalidSnapshot(String),
    #[error("failed to encode capture: {0}")]
    Encode(#[source] image::ImageError),
    #[error("failed to write capture to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("capture dropped: previous capture still being written")]
    Backlogged,
    #[error("capture worker has stopped")]
    WorkerGone,
}

/// Result of one capture attempt, as reported to the notification callback.
pub type CaptureOutcome = Result<CaptureId, SinkError>;

/// Persists capture events.
///
/// Implementations are driven from the capture worker thread, never from the
/// frame loop.
pub trait CaptureSink: Send {
    fn save(&self, event: &CaptureEvent) -> Result<CaptureId, SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("jpg", CaptureFormat::Jpg)]
    #[case("JPEG", CaptureFormat::Jpg)]
    #[case("png", CaptureFormat::Png)]
    fn test_format_from_str(#[case] input: &str, #[case] expected: CaptureFormat) {
        assert_eq!(input.parse::<CaptureFormat>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        assert!("gif".parse::<CaptureFormat>().is_err());
    }

    #[test]
    fn test_format_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&CaptureFormat::Png).unwrap(), "\"png\"");
        let parsed: CaptureFormat = serde_json::from_str("\"jpg\"").unwrap();
        assert_eq!(parsed, CaptureFormat::Jpg);
    }

    #[test]
    fn test_capture_id_displays_file_name() {
        let id = CaptureId {
            name: "smile_20240131_142501".to_string(),
            path: PathBuf::from("/tmp/out/smile_20240131_142501.jpg"),
        };
        assert_eq!(id.to_string(), "smile_20240131_142501.jpg");
    }
}
