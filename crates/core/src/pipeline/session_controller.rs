use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use thiserror::Error;

use crate::capture::domain::capture_sink::{CaptureId, CaptureOutcome, CaptureSink};
use crate::detection::domain::smile_detector::SmileDetector;
use crate::pipeline::camera_slot::CameraSlot;
use crate::pipeline::infrastructure::capture_worker::{CaptureNotifier, CaptureWorker};
use crate::pipeline::pipeline_logger::{LogPipelineLogger, PipelineLogger};
use crate::pipeline::smile_capture_loop::{LoopExit, SmileCaptureLoop};
use crate::shared::frame::Frame;
use crate::video::domain::frame_source::{CameraOpener, DeviceError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Stopped,
    Running,
}

/// Display frames buffered for a slow consumer before the oldest is
/// dropped.
pub const FRAME_QUEUE_DEPTH: usize = 2;

/// Everything the UI side hears from a session apart from display frames,
/// in order.
#[derive(Debug)]
pub enum SessionEvent {
    CaptureSaved(CaptureId),
    CaptureFailed(String),
    StateChanged(RunState),
    SessionEnded(LoopExit),
}

#[derive(Error, Debug)]
pub enum StartError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("could not create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type SinkFactory = Arc<dyn Fn() -> Box<dyn CaptureSink> + Send + Sync>;
pub type LoggerFactory = Arc<dyn Fn() -> Box<dyn PipelineLogger> + Send + Sync>;

/// Creates the capture directory if it does not exist yet.
pub fn ensure_output_dir(dir: &Path) -> Result<(), StartError> {
    std::fs::create_dir_all(dir).map_err(|source| StartError::OutputDir {
        path: dir.to_path_buf(),
        source,
    })
}

/// Starts and stops capture sessions.
///
/// Each session runs the capture loop on its own thread with a freshly
/// opened camera and a fresh debouncer. Every way a session can end
/// releases its camera exactly once.
pub struct SessionController {
    opener: Box<dyn CameraOpener>,
    detector: Arc<dyn SmileDetector>,
    sink_factory: SinkFactory,
    logger_factory: LoggerFactory,
    output_dir: PathBuf,
    state: Arc<Mutex<RunState>>,
    stop: Arc<AtomicBool>,
    camera: Option<CameraSlot>,
    session: Option<JoinHandle<()>>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
    frames: FrameMailbox,
}

impl SessionController {
    pub fn new(
        opener: Box<dyn CameraOpener>,
        detector: Arc<dyn SmileDetector>,
        sink_factory: SinkFactory,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            opener,
            detector,
            sink_factory,
            logger_factory: Arc::new(|| -> Box<dyn PipelineLogger> {
                Box::new(LogPipelineLogger::default())
            }),
            output_dir: output_dir.into(),
            state: Arc::new(Mutex::new(RunState::Stopped)),
            stop: Arc::new(AtomicBool::new(false)),
            camera: None,
            session: None,
            events_tx,
            events_rx,
            frames: FrameMailbox::new(FRAME_QUEUE_DEPTH),
        }
    }

    pub fn with_logger_factory(mut self, factory: LoggerFactory) -> Self {
        self.logger_factory = factory;
        self
    }

    pub fn run_state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Receiver for [`SessionEvent`]s. All clones share one queue.
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.events_rx.clone()
    }

    /// Receiver for annotated display frames, one per tick. Only the latest
    /// [`FRAME_QUEUE_DEPTH`] frames are kept when the consumer falls behind.
    pub fn frames(&self) -> Receiver<Frame> {
        self.frames.rx.clone()
    }

    /// Opens the camera and starts a session. Does nothing if one is
    /// already running.
    ///
    /// On failure nothing is left open and the state stays `Stopped`.
    pub fn start(&mut self) -> Result<(), StartError> {
        if self.session.as_ref().is_some_and(|h| h.is_finished()) {
            self.reap();
        }
        if self.run_state() == RunState::Running {
            log::debug!("start ignored: session already running");
            return Ok(());
        }
        self.reap();

        ensure_output_dir(&self.output_dir)?;
        let source = self.opener.open()?;
        if let Some(meta) = source.metadata() {
            let interval_ms = meta
                .frame_interval()
                .map_or(0.0, |d| d.as_secs_f64() * 1000.0);
            log::info!(
                "Camera {}: {}x{} {} @ {:.1} fps ({interval_ms:.1} ms/frame)",
                meta.device,
                meta.width,
                meta.height,
                meta.codec,
                meta.fps
            );
        }
        let camera = CameraSlot::new(source);

        let stop = Arc::new(AtomicBool::new(false));
        self.stop = stop.clone();
        self.set_state(RunState::Running);

        let session = SessionThread {
            camera: camera.clone(),
            stop,
            detector: self.detector.clone(),
            sink: (self.sink_factory)(),
            logger: (self.logger_factory)(),
            state: self.state.clone(),
            events: self.events_tx.clone(),
            frames: self.frames.clone(),
        };
        self.camera = Some(camera);
        self.session = Some(std::thread::spawn(move || session.run()));
        log::info!("Capture session started");
        Ok(())
    }

    /// Asks the running session to end after its current tick. Does not
    /// wait.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Stops the session, releases the camera now, and waits for the
    /// session thread to finish.
    pub fn shutdown(&mut self) {
        self.stop();
        if let Some(camera) = self.camera.take() {
            camera.release();
        }
        self.reap();
    }

    fn reap(&mut self) {
        if let Some(handle) = self.session.take() {
            if handle.join().is_err() {
                log::error!("Capture session thread panicked");
                self.set_state(RunState::Stopped);
            }
        }
        self.camera = None;
    }

    fn set_state(&self, state: RunState) {
        set_state(&self.state, &self.events_tx, state);
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn set_state(slot: &Mutex<RunState>, events: &Sender<SessionEvent>, state: RunState) {
    *slot.lock().unwrap_or_else(|p| p.into_inner()) = state;
    let _ = events.send(SessionEvent::StateChanged(state));
}

/// Everything a session thread owns.
struct SessionThread {
    camera: CameraSlot,
    stop: Arc<AtomicBool>,
    detector: Arc<dyn SmileDetector>,
    sink: Box<dyn CaptureSink>,
    logger: Box<dyn PipelineLogger>,
    state: Arc<Mutex<RunState>>,
    events: Sender<SessionEvent>,
    frames: FrameMailbox,
}

impl SessionThread {
    fn run(self) {
        let capture_events = self.events.clone();
        let notify: CaptureNotifier = Arc::new(move |outcome: CaptureOutcome| {
            let event = match outcome {
                Ok(id) => SessionEvent::CaptureSaved(id),
                Err(e) => SessionEvent::CaptureFailed(e.to_string()),
            };
            let _ = capture_events.send(event);
        });
        let (queue, worker) = CaptureWorker::spawn(self.sink, notify);

        let frames = self.frames;
        let mut capture_loop = SmileCaptureLoop::new(self.detector, self.logger);
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            capture_loop.run(&self.camera, &mut |frame| frames.push(frame), &queue, &self.stop)
        }));
        let exit = outcome.unwrap_or_else(|payload| {
            let reason = panic_message(payload.as_ref());
            log::error!("Capture loop panicked: {reason}");
            LoopExit::Aborted(reason)
        });

        self.camera.release();
        drop(queue);
        let saved = worker.join();
        log::info!("Capture session ended ({exit:?}), {saved} captures saved");

        set_state(&self.state, &self.events, RunState::Stopped);
        let _ = self.events.send(SessionEvent::SessionEnded(exit));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Bounded frame queue that evicts the oldest frame instead of blocking
/// the producer.
#[derive(Clone)]
struct FrameMailbox {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
}

impl FrameMailbox {
    fn new(depth: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(depth.max(1));
        Self { tx, rx }
    }

    fn push(&self, mut frame: Frame) {
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return,
                Err(TrySendError::Full(f)) => {
                    let _ = self.rx.try_recv();
                    frame = f;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}
