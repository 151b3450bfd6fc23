use thiserror::Error;

use crate::shared::frame::Frame;
use crate::shared::stream_metadata::StreamMetadata;

/// Failure to open a camera. Fatal to the session that tried to start.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("could not open camera '{device}': {reason}")]
    Open { device: String, reason: String },
    #[error("'{0}' has no video stream")]
    NoVideoStream(String),
    #[error("could not set up decoder: {0}")]
    Decoder(String),
}

/// Failure to read the next frame. Terminal for the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameSourceError {
    #[error("end of stream")]
    EndOfStream,
    #[error("frame read failed: {0}")]
    Read(String),
    #[error("camera was released")]
    Released,
}

/// An open camera handle yielding RGB frames one at a time.
///
/// `read` blocks until a frame is available. After `release` every `read`
/// fails with [`FrameSourceError::Released`]; releasing twice is harmless.
pub trait FrameSource: Send {
    fn read(&mut self) -> Result<Frame, FrameSourceError>;

    fn release(&mut self);

    fn metadata(&self) -> Option<&StreamMetadata> {
        None
    }
}

/// Opens a fresh [`FrameSource`] for each session.
pub trait CameraOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>, DeviceError>;
}
