use thiserror::Error;

use crate::detection::domain::detection_result::DetectionResult;
use crate::shared::frame::Frame;

/// Reasons detection could not run on a frame.
///
/// These are degradations, not failures: the pipeline treats them as
/// "no faces this tick" and keeps going.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("classifier backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Domain interface for face + smile detection.
///
/// Implementations are stateless with respect to the frame stream, so one
/// detector can be shared across sessions.
pub trait SmileDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<DetectionResult, DetectionError>;
}
