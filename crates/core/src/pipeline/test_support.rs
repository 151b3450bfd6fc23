//! Scripted collaborators shared by the loop and controller tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::capture::domain::capture_sink::{CaptureEvent, CaptureId, CaptureSink, SinkError};
use crate::detection::domain::detection_result::{DetectionResult, FaceDetection};
use crate::detection::domain::smile_detector::{DetectionError, SmileDetector};
use crate::shared::frame::Frame;
use crate::shared::region::Region;
use crate::video::domain::frame_source::{
    CameraOpener, DeviceError, FrameSource, FrameSourceError,
};

pub const SMILE_VALUE: u8 = 200;
pub const NEUTRAL_VALUE: u8 = 10;
/// Frames with this fill value make [`MarkerDetector`] fail.
pub const BROKEN_VALUE: u8 = 77;

pub fn flat_frame(value: u8, index: usize) -> Frame {
    Frame::new(vec![value; 8 * 6 * 3], 8, 6, 3, index)
}

/// Counts what happened to a [`ScriptedSource`] after it was boxed away.
#[derive(Clone, Default)]
pub struct SourceProbe {
    releases: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl SourceProbe {
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Yields one flat frame per scripted entry (smiling or not), then
/// `EndOfStream`. With `endless` it keeps yielding neutral frames.
pub struct ScriptedSource {
    script: VecDeque<u8>,
    next_index: usize,
    endless: bool,
    frame_delay: Duration,
    released: bool,
    probe: SourceProbe,
}

impl ScriptedSource {
    pub fn new(smiles: Vec<bool>) -> (Self, SourceProbe) {
        let script = smiles
            .into_iter()
            .map(|s| if s { SMILE_VALUE } else { NEUTRAL_VALUE })
            .collect();
        Self::from_values(script)
    }

    pub fn from_values(values: Vec<u8>) -> (Self, SourceProbe) {
        let probe = SourceProbe::default();
        let source = Self {
            script: values.into(),
            next_index: 0,
            endless: false,
            frame_delay: Duration::ZERO,
            released: false,
            probe: probe.clone(),
        };
        (source, probe)
    }

    pub fn endless(frame_delay: Duration) -> (Self, SourceProbe) {
        let (mut source, probe) = Self::from_values(Vec::new());
        source.endless = true;
        source.frame_delay = frame_delay;
        (source, probe)
    }
}

impl FrameSource for ScriptedSource {
    fn read(&mut self) -> Result<Frame, FrameSourceError> {
        if self.released {
            return Err(FrameSourceError::Released);
        }
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        if !self.frame_delay.is_zero() {
            std::thread::sleep(self.frame_delay);
        }
        let value = match self.script.pop_front() {
            Some(v) => v,
            None if self.endless => NEUTRAL_VALUE,
            None => return Err(FrameSourceError::EndOfStream),
        };
        let frame = flat_frame(value, self.next_index);
        self.next_index += 1;
        Ok(frame)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.probe.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Reports one smiling face for frames filled with [`SMILE_VALUE`], one
/// neutral face for [`NEUTRAL_VALUE`], and fails on [`BROKEN_VALUE`].
pub struct MarkerDetector;

impl SmileDetector for MarkerDetector {
    fn detect(&self, frame: &Frame) -> Result<DetectionResult, DetectionError> {
        let face = Region::new(1, 1, 6, 4);
        match frame.data().first().copied() {
            Some(SMILE_VALUE) => Ok(DetectionResult::new(vec![FaceDetection::new(
                face,
                vec![Region::new(2, 3, 4, 2)],
            )])),
            Some(BROKEN_VALUE) => Err(DetectionError::BackendUnavailable("broken".to_string())),
            _ => Ok(DetectionResult::new(vec![FaceDetection::new(face, Vec::new())])),
        }
    }
}

/// Records the frame index of every saved capture, optionally waiting on a
/// gate before each save.
pub struct RecordingSink {
    pub saved: Arc<Mutex<Vec<usize>>>,
    pub gate: Option<crossbeam_channel::Receiver<()>>,
}

impl RecordingSink {
    pub fn new() -> (Self, Arc<Mutex<Vec<usize>>>) {
        let saved = Arc::new(Mutex::new(Vec::new()));
        let sink = Self {
            saved: saved.clone(),
            gate: None,
        };
        (sink, saved)
    }
}

impl CaptureSink for RecordingSink {
    fn save(&self, event: &CaptureEvent) -> Result<CaptureId, SinkError> {
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        let index = event.snapshot.index();
        self.saved.lock().unwrap().push(index);
        Ok(CaptureId {
            name: format!("smile_{index}"),
            path: format!("smile_{index}.jpg").into(),
        })
    }
}

/// Hands out pre-built sources and counts `open` calls.
pub struct ScriptedOpener {
    sources: Mutex<VecDeque<Result<ScriptedSource, DeviceError>>>,
    pub opens: Arc<AtomicUsize>,
}

impl ScriptedOpener {
    pub fn new(sources: Vec<Result<ScriptedSource, DeviceError>>) -> Self {
        Self {
            sources: Mutex::new(sources.into()),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl CameraOpener for ScriptedOpener {
    fn open(&self) -> Result<Box<dyn FrameSource>, DeviceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.sources.lock().unwrap().pop_front() {
            Some(Ok(source)) => Ok(Box::new(source)),
            Some(Err(e)) => Err(e),
            None => Err(DeviceError::Open {
                device: "scripted".to_string(),
                reason: "no more sources".to_string(),
            }),
        }
    }
}
