use std::sync::{Arc, Mutex, MutexGuard};

use crate::shared::frame::Frame;
use crate::video::domain::frame_source::{FrameSource, FrameSourceError};

/// Shared home of the session's open camera.
///
/// The loop reads through the slot and the controller releases through it,
/// so a release waits for at most one in-flight read. Whoever takes the
/// source out releases it, which makes release happen at most once.
#[derive(Clone)]
pub struct CameraSlot {
    inner: Arc<Mutex<Option<Box<dyn FrameSource>>>>,
}

impl CameraSlot {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(source))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn FrameSource>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn read(&self) -> Result<Frame, FrameSourceError> {
        match self.lock().as_mut() {
            Some(source) => source.read(),
            None => Err(FrameSourceError::Released),
        }
    }

    /// Takes the source out and releases it. Returns `false` if it was
    /// already gone.
    pub fn release(&self) -> bool {
        let taken = self.lock().take();
        match taken {
            Some(mut source) => {
                source.release();
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::ScriptedSource;

    #[test]
    fn test_read_delegates_until_released() {
        let (source, probe) = ScriptedSource::new(vec![false, false]);
        let slot = CameraSlot::new(Box::new(source));
        assert_eq!(slot.read().unwrap().index(), 0);
        assert!(slot.release());
        assert!(!slot.is_open());
        assert_eq!(slot.read().unwrap_err(), FrameSourceError::Released);
        assert_eq!(probe.releases(), 1);
    }

    #[test]
    fn test_second_release_is_noop() {
        let (source, probe) = ScriptedSource::new(vec![]);
        let slot = CameraSlot::new(Box::new(source));
        let clone = slot.clone();
        assert!(slot.release());
        assert!(!clone.release());
        assert_eq!(probe.releases(), 1);
    }
}
