use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::capture::domain::capture_sink::CaptureEvent;
use crate::debounce::domain::smile_debouncer::{DebounceState, SmileDebouncer};
use crate::detection::domain::detection_result::DetectionResult;
use crate::detection::domain::smile_detector::SmileDetector;
use crate::pipeline::camera_slot::CameraSlot;
use crate::pipeline::frame_annotator::annotate;
use crate::pipeline::infrastructure::capture_worker::CaptureQueue;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::frame::Frame;

/// Degraded detections are logged on the first occurrence and then every
/// this many.
const DEGRADED_LOG_EVERY: u64 = 100;

/// Why a loop run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopExit {
    StopRequested,
    SourceEnded(String),
    /// The loop panicked; carries the panic message.
    Aborted(String),
}

/// The per-frame capture pipeline: read, mirror, detect, annotate,
/// debounce, hand off captures, deliver the display frame.
///
/// One instance per session; the debouncer starts `Idle` on every run.
pub struct SmileCaptureLoop {
    detector: Arc<dyn SmileDetector>,
    debouncer: SmileDebouncer,
    logger: Box<dyn PipelineLogger>,
    degraded: u64,
}

impl SmileCaptureLoop {
    pub fn new(detector: Arc<dyn SmileDetector>, logger: Box<dyn PipelineLogger>) -> Self {
        Self {
            detector,
            debouncer: SmileDebouncer::new(),
            logger,
            degraded: 0,
        }
    }

    pub fn debounce_state(&self) -> DebounceState {
        self.debouncer.state()
    }

    /// Runs ticks until `stop` is observed or the camera fails to deliver.
    ///
    /// `on_frame_ready` receives exactly one annotated frame per completed
    /// tick. Captures are queued without blocking; the loop never waits on
    /// disk I/O.
    pub fn run(
        &mut self,
        camera: &CameraSlot,
        on_frame_ready: &mut dyn FnMut(Frame),
        captures: &CaptureQueue,
        stop: &AtomicBool,
    ) -> LoopExit {
        self.debouncer.reset();
        let exit = loop {
            if stop.load(Ordering::SeqCst) {
                break LoopExit::StopRequested;
            }
            match self.tick(camera, on_frame_ready, captures) {
                Ok(()) => {}
                Err(exit) => break exit,
            }
        };

        match &exit {
            LoopExit::StopRequested => self.logger.info("Capture loop stopped"),
            LoopExit::SourceEnded(reason) => {
                self.logger.info(&format!("Camera stopped delivering frames: {reason}"))
            }
            LoopExit::Aborted(reason) => self.logger.info(&format!("Capture loop aborted: {reason}")),
        }
        self.logger.summary();
        exit
    }

    fn tick(
        &mut self,
        camera: &CameraSlot,
        on_frame_ready: &mut dyn FnMut(Frame),
        captures: &CaptureQueue,
    ) -> Result<(), LoopExit> {
        let t0 = Instant::now();
        let raw = camera
            .read()
            .map_err(|e| LoopExit::SourceEnded(e.to_string()))?;
        self.logger.timing("read", elapsed_ms(t0));

        let frame = raw.flip_horizontal();
        let index = frame.index();

        let t1 = Instant::now();
        let detection = self.detect(&frame);
        self.logger.timing("detect", elapsed_ms(t1));
        self.logger.metric("faces", detection.faces.len() as f64);

        let t2 = Instant::now();
        let mut display = frame.clone();
        annotate(&mut display, &detection);
        self.logger.timing("annotate", elapsed_ms(t2));

        if let Some(trigger) = self.debouncer.update(detection.aggregate_smile(), index) {
            log::info!("Smile detected at frame {}", trigger.frame_index);
            captures.submit(CaptureEvent::now(frame));
        }

        on_frame_ready(display);
        self.logger.tick(index);
        Ok(())
    }

    fn detect(&mut self, frame: &Frame) -> DetectionResult {
        match self.detector.detect(frame) {
            Ok(result) => result,
            Err(e) => {
                self.degraded += 1;
                if self.degraded == 1 || self.degraded % DEGRADED_LOG_EVERY == 0 {
                    log::warn!(
                        "Detection failed on frame {} ({} so far): {e}",
                        frame.index(),
                        self.degraded
                    );
                }
                DetectionResult::empty()
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::capture_sink::CaptureOutcome;
    use crate::pipeline::infrastructure::capture_worker::{CaptureNotifier, CaptureWorker};
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::pipeline::test_support::{
        MarkerDetector, RecordingSink, ScriptedSource, BROKEN_VALUE, NEUTRAL_VALUE, SMILE_VALUE,
    };
    use crate::shared::constants::FACE_MARKER_COLOR;
    use std::sync::Mutex;
    use std::time::Duration;

    fn new_loop() -> SmileCaptureLoop {
        SmileCaptureLoop::new(Arc::new(MarkerDetector), Box::new(NullPipelineLogger))
    }

    fn counting_notifier() -> (CaptureNotifier, Arc<Mutex<Vec<bool>>>) {
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let store = outcomes.clone();
        let notify: CaptureNotifier = Arc::new(move |o: CaptureOutcome| {
            store.lock().unwrap().push(o.is_ok());
        });
        (notify, outcomes)
    }

    struct Run {
        exit: LoopExit,
        displayed: Vec<Frame>,
        saved: Vec<usize>,
        outcomes: Vec<bool>,
    }

    fn run_source(source: ScriptedSource) -> Run {
        let (sink, saved) = RecordingSink::new();
        let (notify, outcomes) = counting_notifier();
        let (queue, worker) = CaptureWorker::spawn(Box::new(sink), notify);
        let camera = CameraSlot::new(Box::new(source));
        let stop = AtomicBool::new(false);

        let mut displayed = Vec::new();
        let exit = new_loop().run(&camera, &mut |f| displayed.push(f), &queue, &stop);
        drop(queue);
        worker.join();

        let saved = saved.lock().unwrap().clone();
        let outcomes = outcomes.lock().unwrap().clone();
        Run {
            exit,
            displayed,
            saved,
            outcomes,
        }
    }

    #[test]
    fn test_held_smile_captures_once_from_first_frame() {
        // Frames 4..=7 (1-based) smile.
        let smiles = (1..=10).map(|i| (4..=7).contains(&i)).collect();
        let (source, probe) = ScriptedSource::new(smiles);
        let run = run_source(source);

        assert_eq!(run.exit, LoopExit::SourceEnded("end of stream".to_string()));
        assert_eq!(run.saved, vec![3]);
        assert_eq!(run.outcomes, vec![true]);
        assert_eq!(run.displayed.len(), 10);
        assert_eq!(probe.reads(), 11);
    }

    #[test]
    fn test_each_smile_run_captures_once() {
        let (source, _) = ScriptedSource::new(vec![false, false, true, true, false, true]);
        let run = run_source(source);
        assert_eq!(run.saved.len() + run.outcomes.iter().filter(|ok| !**ok).count(), 2);
        assert_eq!(run.saved.first(), Some(&2));
    }

    #[test]
    fn test_display_frame_every_tick_is_annotated_and_in_order() {
        let (source, _) = ScriptedSource::new(vec![false, true, false]);
        let run = run_source(source);

        let indices: Vec<usize> = run.displayed.iter().map(|f| f.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        for frame in &run.displayed {
            // Top-left of the face outline at (1, 1).
            let o = (frame.width() as usize + 1) * 3;
            assert_eq!(&frame.data()[o..o + 3], &FACE_MARKER_COLOR);
        }
    }

    #[test]
    fn test_degraded_detection_keeps_loop_running() {
        let (source, _) = ScriptedSource::from_values(vec![
            BROKEN_VALUE,
            BROKEN_VALUE,
            SMILE_VALUE,
            BROKEN_VALUE,
            SMILE_VALUE,
        ]);
        let run = run_source(source);

        assert_eq!(run.displayed.len(), 5);
        // A failed detection counts as "no smile", ending the first run.
        assert_eq!(run.saved.len() + run.outcomes.iter().filter(|ok| !**ok).count(), 2);
        // Degraded frames are shown without markers.
        assert_eq!(run.displayed[0].data()[0], BROKEN_VALUE);
    }

    #[test]
    fn test_read_failure_ends_session() {
        let (source, probe) = ScriptedSource::new(vec![]);
        let run = run_source(source);
        assert!(matches!(run.exit, LoopExit::SourceEnded(_)));
        assert!(run.displayed.is_empty());
        assert_eq!(probe.reads(), 1);
    }

    #[test]
    fn test_stop_flag_checked_before_reading() {
        let (source, probe) = ScriptedSource::new(vec![true, true]);
        let (sink, saved) = RecordingSink::new();
        let (notify, _) = counting_notifier();
        let (queue, worker) = CaptureWorker::spawn(Box::new(sink), notify);
        let camera = CameraSlot::new(Box::new(source));
        let stop = AtomicBool::new(true);

        let exit = new_loop().run(&camera, &mut |_| {}, &queue, &stop);
        drop(queue);
        worker.join();

        assert_eq!(exit, LoopExit::StopRequested);
        assert_eq!(probe.reads(), 0);
        assert!(saved.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stop_from_display_callback_ends_after_current_tick() {
        let (source, probe) = ScriptedSource::endless(Duration::ZERO);
        let (sink, _) = RecordingSink::new();
        let (notify, _) = counting_notifier();
        let (queue, worker) = CaptureWorker::spawn(Box::new(sink), notify);
        let camera = CameraSlot::new(Box::new(source));
        let stop = AtomicBool::new(false);

        let mut shown = 0;
        let exit = new_loop().run(
            &camera,
            &mut |_| {
                shown += 1;
                if shown == 3 {
                    stop.store(true, Ordering::SeqCst);
                }
            },
            &queue,
            &stop,
        );
        drop(queue);
        worker.join();

        assert_eq!(exit, LoopExit::StopRequested);
        assert_eq!(shown, 3);
        assert_eq!(probe.reads(), 3);
    }

    #[test]
    fn test_slow_sink_does_not_delay_frames() {
        let values = (0..12)
            .map(|i| if i % 2 == 0 { SMILE_VALUE } else { NEUTRAL_VALUE })
            .collect();
        let (source, _) = ScriptedSource::from_values(values);
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let (mut sink, saved) = RecordingSink::new();
        sink.gate = Some(gate_rx);
        let (notify, outcomes) = counting_notifier();
        let (queue, worker) = CaptureWorker::spawn(Box::new(sink), notify);
        let camera = CameraSlot::new(Box::new(source));
        let stop = AtomicBool::new(false);

        // The sink is blocked for the whole run, yet every frame is shown.
        let mut shown = 0;
        let exit = new_loop().run(&camera, &mut |_| shown += 1, &queue, &stop);
        assert!(matches!(exit, LoopExit::SourceEnded(_)));
        assert_eq!(shown, 12);
        assert!(saved.lock().unwrap().is_empty());

        let rejected = outcomes.lock().unwrap().iter().filter(|ok| !**ok).count();
        assert!(rejected >= 4, "only {rejected} captures were backlogged");

        drop(queue);
        drop(gate_tx);
        worker.join();
        assert!(saved.lock().unwrap().len() <= 2);
    }

    #[test]
    fn test_run_resets_debouncer() {
        let (sink, _) = RecordingSink::new();
        let (notify, outcomes) = counting_notifier();
        let (queue, worker) = CaptureWorker::spawn(Box::new(sink), notify);
        let stop = AtomicBool::new(false);
        let mut capture_loop = new_loop();

        let (source, _) = ScriptedSource::new(vec![true]);
        capture_loop.run(&CameraSlot::new(Box::new(source)), &mut |_| {}, &queue, &stop);
        assert_eq!(capture_loop.debounce_state(), DebounceState::SmileActive);

        // A new session starting mid-smile triggers again.
        let (again, _) = ScriptedSource::new(vec![true]);
        capture_loop.run(&CameraSlot::new(Box::new(again)), &mut |_| {}, &queue, &stop);
        drop(queue);
        worker.join();
        assert_eq!(outcomes.lock().unwrap().len(), 2);
    }
}
