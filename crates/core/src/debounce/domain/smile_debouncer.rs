/// Whether the debouncer is waiting for a smile or riding one out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DebounceState {
    #[default]
    Idle,
    SmileActive,
}

/// Emitted on the rising edge of a smile run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SmileTrigger {
    /// Index of the frame that started the run.
    pub frame_index: usize,
}

/// Turns a per-frame smile signal into one trigger per contiguous run of
/// smiling frames.
///
/// A smile held across many frames captures once; the signal has to drop to
/// `false` for at least one frame before the next trigger can fire.
#[derive(Debug, Default)]
pub struct SmileDebouncer {
    state: DebounceState,
    triggers: u64,
}

impl SmileDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one frame's aggregate smile signal.
    pub fn update(&mut self, smiling: bool, frame_index: usize) -> Option<SmileTrigger> {
        match (self.state, smiling) {
            (DebounceState::Idle, true) => {
                self.state = DebounceState::SmileActive;
                self.triggers += 1;
                Some(SmileTrigger { frame_index })
            }
            (DebounceState::SmileActive, false) => {
                self.state = DebounceState::Idle;
                None
            }
            _ => None,
        }
    }

    /// Back to `Idle`, e.g. when a new session starts.
    pub fn reset(&mut self) {
        self.state = DebounceState::Idle;
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    /// Triggers emitted since construction.
    pub fn trigger_count(&self) -> u64 {
        self.triggers
    }
}
