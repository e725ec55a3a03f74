use crate::pipeline::{ProgressSample, SIMULATED_PROGRESS_CAP};
use std::time::Duration;

/// Timer-driven stand-in for progress before the remote reports anything
///
/// Each stage is given `step_duration` of wall-clock time. Every tick adds
/// `tick_interval` to the elapsed time of the current stage and produces a
/// simulated sample. The value never exceeds [`SIMULATED_PROGRESS_CAP`] and
/// the last stage is never left, so the simulation cannot finish a run on
/// its own.
#[derive(Debug, Clone)]
pub struct LocalSimulator {
    stage_count: usize,
    step_duration: Duration,
    tick_interval: Duration,
    current_stage_index: usize,
    stage_elapsed: Duration,
    run_elapsed: Duration,
    stopped: bool,
}

impl LocalSimulator {
    pub fn new(stage_count: usize, step_duration: Duration, tick_interval: Duration) -> Self {
        Self {
            stage_count: stage_count.max(1),
            step_duration: step_duration.max(Duration::from_millis(1)),
            tick_interval,
            current_stage_index: 0,
            stage_elapsed: Duration::ZERO,
            run_elapsed: Duration::ZERO,
            stopped: false,
        }
    }

    pub fn current_stage_index(&self) -> usize {
        self.current_stage_index
    }

    pub fn stage_elapsed(&self) -> Duration {
        self.stage_elapsed
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stop producing samples for good
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Progress of the current stage in `[0, 1]`
    fn stage_fraction(&self) -> f64 {
        let fraction = self.stage_elapsed.as_secs_f64() / self.step_duration.as_secs_f64();
        fraction.min(1.0)
    }

    /// Advance simulated time by one tick
    ///
    /// Returns `None` once stopped.
    pub fn tick(&mut self) -> Option<ProgressSample> {
        if self.stopped {
            return None;
        }

        self.stage_elapsed += self.tick_interval;
        self.run_elapsed += self.tick_interval;

        let overall = (self.current_stage_index as f64 + self.stage_fraction())
            / self.stage_count as f64
            * 100.0;
        let overall = overall.min(SIMULATED_PROGRESS_CAP);

        // Elapsed time is per stage and reset on advance, so one tick crosses
        // at most one boundary however late it fires
        let boundary_reached = self.stage_elapsed >= self.step_duration;
        let has_next = self.current_stage_index + 1 < self.stage_count;

        if boundary_reached && has_next {
            self.current_stage_index += 1;
            self.stage_elapsed = Duration::ZERO;
        }

        Some(ProgressSample::simulated(
            self.current_stage_index,
            overall,
            self.run_elapsed.as_millis() as u64,
        ))
    }
}
