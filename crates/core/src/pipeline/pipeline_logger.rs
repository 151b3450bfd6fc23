use std::collections::HashMap;
use std::time::Instant;

/// Observer for per-tick loop events.
///
/// Keeps the capture loop free of any particular output mechanism; the CLI
/// logs through the `log` crate, tests discard everything.
pub trait PipelineLogger: Send {
    /// Called once per completed tick with the frame index just processed.
    fn tick(&mut self, frame_index: usize);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. face count).
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Emit an end-of-session summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn tick(&mut self, _frame_index: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Accumulates per-stage timings and metrics and logs a summary when the
/// session ends.
///
/// Tick progress is logged every `throttle_frames` frames at debug level.
pub struct LogPipelineLogger {
    throttle_frames: usize,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
    total_frames: usize,
}

impl LogPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            total_frames: 0,
        }
    }

    /// Returns the formatted summary string, or `None` if no data recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let frames = self.total_frames;
        let mut lines = vec![format!(
            "Session summary ({frames} frames, {:.1}s total):",
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = mean(durations);
            lines.push(format!(
                "  {stage:10}: avg {avg_ms:6.1}ms  max {:6.1}ms",
                durations.iter().copied().fold(0.0, f64::max)
            ));
            log::trace!("{stage} total {total_ms:.0}ms");
        }

        let mut metric_names: Vec<_> = self.metrics.keys().collect();
        metric_names.sort();
        for name in metric_names {
            lines.push(format!("  {name}: avg {:.1}", mean(&self.metrics[name])));
        }

        if frames > 0 && elapsed_ms > 0.0 {
            let fps = frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }
}

impl Default for LogPipelineLogger {
    fn default() -> Self {
        Self::new(300)
    }
}

impl PipelineLogger for LogPipelineLogger {
    fn tick(&mut self, frame_index: usize) {
        self.total_frames += 1;
        if self.total_frames % self.throttle_frames == 0 {
            log::debug!("Processed {} frames (last index {frame_index})", self.total_frames);
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullPipelineLogger;
        logger.tick(1);
        logger.timing("detect", 5.0);
        logger.metric("faces", 3.0);
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_timing_records_values() {
        let mut logger = LogPipelineLogger::new(10);
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("read", 5.0);

        assert_eq!(logger.timings_for("detect").unwrap(), &[20.0, 30.0]);
        assert_eq!(logger.timings_for("read").unwrap(), &[5.0]);
        assert!(logger.timings_for("annotate").is_none());
    }

    #[test]
    fn test_metric_average_in_summary() {
        let mut logger = LogPipelineLogger::new(10);
        logger.metric("faces", 1.0);
        logger.metric("faces", 2.0);

        assert_relative_eq!(mean(logger.metrics_for("faces").unwrap()), 1.5);
        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("faces: avg 1.5"));
    }

    #[test]
    fn test_summary_lists_stages_and_fps() {
        let mut logger = LogPipelineLogger::new(10);
        for i in 0..100 {
            logger.tick(i);
        }
        logger.timing("detect", 10.0);
        logger.timing("read", 2.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Session summary (100 frames"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("read"));
        assert!(summary.contains("fps"));
    }

    #[test]
    fn test_tick_counts_frames() {
        let mut logger = LogPipelineLogger::new(7);
        for i in 10..30 {
            logger.tick(i);
        }
        assert_eq!(logger.total_frames(), 20);
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(LogPipelineLogger::default().summary_string().is_none());
    }

    #[test]
    fn test_mean_of_empty_is_zero() {
        assert_relative_eq!(mean(&[]), 0.0);
    }
}
