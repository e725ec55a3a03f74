use super::catalog::{Stage, StageCatalog};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest progress the local simulation may ever report
pub const SIMULATED_PROGRESS_CAP: f64 = 95.0;

/// Highest progress a run may show while it is still running
///
/// Only a terminal `Completed` outcome reaches 100.
pub const RUNNING_PROGRESS_CAP: f64 = 99.0;

/// Identifier of a run, as issued by the remote task manager
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh id for runs that never had a remote task
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Lifecycle of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Pending,
    Active,
    Completed,
    Failed,
}

impl StageState {
    /// Completed and Failed never change again
    pub fn is_settled(&self) -> bool {
        matches!(self, StageState::Completed | StageState::Failed)
    }
}

/// Run-level outcome; both non-running values are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Running,
    Completed,
    Failed,
}

impl RunOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunOutcome::Running)
    }
}

/// Which producer a sample came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleSource {
    Simulated,
    Remote,
}

/// A progress estimate handed to the controller
///
/// Samples are consumed by a single reconciliation step and never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub source: SampleSource,

    /// Stage the producer believes is current
    pub stage_index: usize,

    /// Overall progress in `[0, 100]`
    pub overall_progress: f64,

    /// Milliseconds since the run started
    pub timestamp_ms: u64,
}

impl ProgressSample {
    pub fn simulated(stage_index: usize, overall_progress: f64, timestamp_ms: u64) -> Self {
        Self {
            source: SampleSource::Simulated,
            stage_index,
            overall_progress,
            timestamp_ms,
        }
    }

    pub fn remote(stage_index: usize, overall_progress: f64, timestamp_ms: u64) -> Self {
        Self {
            source: SampleSource::Remote,
            stage_index,
            overall_progress,
            timestamp_ms,
        }
    }
}

/// A catalog stage paired with its current state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStatus {
    pub stage: Stage,
    pub state: StageState,
}

impl StageStatus {
    /// Display text matching the current state
    pub fn label(&self) -> &str {
        match self.state {
            StageState::Pending => &self.stage.display.idle,
            StageState::Active => &self.stage.display.active,
            StageState::Completed => &self.stage.display.completed,
            StageState::Failed => &self.stage.display.failed,
        }
    }
}

/// The aggregate owned by the reconciliation controller
///
/// Observers receive clones of this value; it is the single source that
/// presentation code projects from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub run_id: RunId,
    pub stages: Vec<StageStatus>,
    pub overall_progress: f64,
    pub current_stage_index: Option<usize>,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineRun {
    /// All stages pending, nothing done
    pub fn new(run_id: RunId, catalog: &StageCatalog) -> Self {
        Self {
            run_id,
            stages: catalog
                .stages()
                .iter()
                .cloned()
                .map(|stage| StageStatus {
                    stage,
                    state: StageState::Pending,
                })
                .collect(),
            overall_progress: 0.0,
            current_stage_index: None,
            outcome: RunOutcome::Running,
            started_at: Utc::now(),
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_terminal()
    }

    pub fn stage_state(&self, index: usize) -> Option<StageState> {
        self.stages.get(index).map(|s| s.state)
    }

    /// State of the stage with the given id
    pub fn state_of(&self, id: &str) -> Option<StageState> {
        self.stages
            .iter()
            .find(|s| s.stage.id == id)
            .map(|s| s.state)
    }

    pub fn active_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.state == StageState::Active)
            .count()
    }

    pub fn completed_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.state == StageState::Completed)
            .count()
    }

    /// Number of leading stages that are Completed
    fn completed_prefix(&self) -> usize {
        self.stages
            .iter()
            .take_while(|s| s.state == StageState::Completed)
            .count()
    }

    /// Where the stage cursor currently sits
    fn cursor(&self) -> usize {
        self.current_stage_index
            .unwrap_or_else(|| self.completed_prefix())
    }

    /// Raise overall progress to `candidate`, clamped to `[0, cap]`
    ///
    /// Never lowers the value. Returns whether anything changed.
    pub(crate) fn raise_progress(&mut self, candidate: f64, cap: f64) -> bool {
        if !candidate.is_finite() {
            return false;
        }
        let candidate = candidate.clamp(0.0, cap);
        if candidate > self.overall_progress {
            self.overall_progress = candidate;
            true
        } else {
            false
        }
    }

    /// Move the stage cursor forward to `target`
    ///
    /// Stages before `target` become Completed and `target` becomes Active.
    /// `target == len` completes every stage and clears the cursor. Targets
    /// behind the cursor, and any move past a Failed stage, are ignored.
    /// Returns whether any stage state changed.
    pub(crate) fn advance_to(&mut self, target: usize) -> bool {
        let len = self.stages.len();
        if target > len {
            return false;
        }

        let cursor = self.cursor();
        if target < cursor {
            return false;
        }
        if self.stages[cursor.min(len)..target]
            .iter()
            .any(|s| s.state == StageState::Failed)
        {
            return false;
        }

        let mut changed = false;
        for status in &mut self.stages[..target] {
            if status.state != StageState::Completed {
                status.state = StageState::Completed;
                changed = true;
            }
        }

        if target < len {
            if self.stages[target].state == StageState::Pending {
                self.stages[target].state = StageState::Active;
                changed = true;
            }
            if self.current_stage_index != Some(target) {
                self.current_stage_index = Some(target);
                changed = true;
            }
        } else if self.current_stage_index.is_some() {
            self.current_stage_index = None;
            changed = true;
        }

        changed
    }

    /// Mark the stage at `index` Failed, only if it is the Active one
    pub(crate) fn fail_stage(&mut self, index: usize) -> bool {
        match self.stages.get_mut(index) {
            Some(status) if status.state == StageState::Active => {
                status.state = StageState::Failed;
                true
            }
            _ => false,
        }
    }

    /// Terminal success: every stage Completed, progress 100
    pub(crate) fn complete(&mut self) {
        for status in &mut self.stages {
            status.state = StageState::Completed;
        }
        self.current_stage_index = None;
        self.overall_progress = 100.0;
        self.outcome = RunOutcome::Completed;
    }

    /// Terminal failure; stage states stay as last known
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.outcome = RunOutcome::Failed;
        self.error = Some(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> PipelineRun {
        PipelineRun::new(RunId::new("run-1"), &StageCatalog::labeling_pipeline())
    }

    fn states(run: &PipelineRun) -> Vec<StageState> {
        run.stages.iter().map(|s| s.state).collect()
    }

    #[test]
    fn test_new_run_is_pending() {
        let run = run();
        assert_eq!(run.overall_progress, 0.0);
        assert_eq!(run.outcome, RunOutcome::Running);
        assert_eq!(run.current_stage_index, None);
        assert!(run.stages.iter().all(|s| s.state == StageState::Pending));
    }

    #[test]
    fn test_raise_progress_never_lowers() {
        let mut run = run();
        assert!(run.raise_progress(40.0, RUNNING_PROGRESS_CAP));
        assert!(!run.raise_progress(20.0, RUNNING_PROGRESS_CAP));
        assert_eq!(run.overall_progress, 40.0);
    }

    #[test]
    fn test_raise_progress_clamps_to_cap() {
        let mut run = run();
        assert!(run.raise_progress(100.0, SIMULATED_PROGRESS_CAP));
        assert_eq!(run.overall_progress, SIMULATED_PROGRESS_CAP);
        assert!(!run.raise_progress(f64::NAN, RUNNING_PROGRESS_CAP));
    }

    #[test]
    fn test_advance_marks_predecessors_completed() {
        let mut run = run();
        assert!(run.advance_to(2));
        assert_eq!(
            &states(&run)[..4],
            &[
                StageState::Completed,
                StageState::Completed,
                StageState::Active,
                StageState::Pending
            ]
        );
        assert_eq!(run.current_stage_index, Some(2));
        assert_eq!(run.active_count(), 1);
    }

    #[test]
    fn test_advance_backwards_ignored() {
        let mut run = run();
        run.advance_to(3);
        assert!(!run.advance_to(1));
        assert_eq!(run.current_stage_index, Some(3));
        assert_eq!(run.stage_state(1), Some(StageState::Completed));
    }

    #[test]
    fn test_advance_to_same_stage_is_noop() {
        let mut run = run();
        assert!(run.advance_to(0));
        assert!(!run.advance_to(0));
    }

    #[test]
    fn test_advance_past_end_ignored() {
        let mut run = run();
        assert!(!run.advance_to(7));
        assert!(run.advance_to(6));
        assert_eq!(run.completed_count(), 6);
        assert_eq!(run.current_stage_index, None);
    }

    #[test]
    fn test_failed_stage_blocks_advance() {
        let mut run = run();
        run.advance_to(1);
        assert!(run.fail_stage(1));
        assert!(!run.advance_to(3));
        assert_eq!(run.stage_state(1), Some(StageState::Failed));
        assert_eq!(run.stage_state(2), Some(StageState::Pending));
    }

    #[test]
    fn test_fail_stage_requires_active() {
        let mut run = run();
        run.advance_to(2);
        assert!(!run.fail_stage(0));
        assert!(!run.fail_stage(4));
        assert_eq!(run.stage_state(0), Some(StageState::Completed));
    }

    #[test]
    fn test_complete_and_fail() {
        let mut done = run();
        done.advance_to(1);
        done.complete();
        assert_eq!(done.overall_progress, 100.0);
        assert_eq!(done.completed_count(), 6);
        assert!(done.is_terminal());

        let mut failed = run();
        failed.advance_to(2);
        failed.fail("E1");
        assert_eq!(failed.outcome, RunOutcome::Failed);
        assert_eq!(failed.error.as_deref(), Some("E1"));
        assert_eq!(failed.stage_state(2), Some(StageState::Active));
    }

    #[test]
    fn test_stage_label_follows_state() {
        let mut run = run();
        run.advance_to(1);
        assert_eq!(run.stages[0].label(), "Routing document done");
        assert_eq!(run.stages[1].label(), "Extracting content...");
        assert_eq!(run.stages[2].label(), "Classifying category");
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let run = run();
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["runId"], "run-1");
        assert_eq!(json["outcome"], "running");
        assert!(json.get("overallProgress").is_some());
        assert!(json.get("error").is_none());
    }
}
