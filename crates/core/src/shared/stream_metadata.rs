/// Properties of an opened camera stream, fixed for the session.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    pub device: String,
}

impl StreamMetadata {
    /// Nominal time between frames, if the source reports a rate.
    pub fn frame_interval(&self) -> Option<std::time::Duration> {
        if self.fps > 0.0 {
            Some(std::time::Duration::from_secs_f64(1.0 / self.fps))
        } else {
            None
        }
    }
}
