use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, TrySendError};

use crate::capture::domain::capture_sink::{CaptureEvent, CaptureOutcome, CaptureSink, SinkError};

/// Receives every capture outcome, from whichever thread produced it.
pub type CaptureNotifier = Arc<dyn Fn(CaptureOutcome) + Send + Sync>;

/// Non-blocking handle the frame loop uses to hand off captures.
///
/// Holds at most one pending event beyond the one being written. Dropping
/// the queue lets the worker drain and exit.
pub struct CaptureQueue {
    tx: Sender<CaptureEvent>,
    notify: CaptureNotifier,
}

impl CaptureQueue {
    /// Queues `event` without waiting. Returns `false` if it was rejected,
    /// in which case the notifier has already been told why.
    pub fn submit(&self, event: CaptureEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!("Capture dropped: previous capture still being written");
                (self.notify)(Err(SinkError::Backlogged));
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("Capture dropped: capture worker has stopped");
                (self.notify)(Err(SinkError::WorkerGone));
                false
            }
        }
    }
}

/// Owns the capture sink on a dedicated thread so encoding and disk writes
/// never stall the frame loop.
pub struct CaptureWorker {
    handle: JoinHandle<usize>,
}

impl CaptureWorker {
    pub fn spawn(sink: Box<dyn CaptureSink>, notify: CaptureNotifier) -> (CaptureQueue, Self) {
        let (tx, rx) = crossbeam_channel::bounded::<CaptureEvent>(1);
        let worker_notify = notify.clone();

        let handle = std::thread::spawn(move || {
            let mut saved = 0;
            for event in rx {
                let outcome = sink.save(&event);
                match &outcome {
                    Ok(id) => {
                        saved += 1;
                        log::info!("Saved capture {}", id.path.display());
                    }
                    Err(e) => log::warn!("Capture failed: {e}"),
                }
                worker_notify(outcome);
            }
            saved
        });

        (CaptureQueue { tx, notify }, Self { handle })
    }

    /// Waits for queued writes to finish. The matching [`CaptureQueue`] must
    /// have been dropped first. Returns the number of captures saved.
    pub fn join(self) -> usize {
        match self.handle.join() {
            Ok(saved) => saved,
            Err(_) => {
                log::error!("Capture worker panicked");
                0
            }
        }
    }
}
