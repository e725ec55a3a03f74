//! Pipeline description and run state
//!
//! A [`StageCatalog`] describes the ordered stages of the remote pipeline.
//! A [`PipelineRun`] pairs every catalog stage with its [`StageState`] and
//! carries the overall progress and outcome of one execution.
//!
//! # Example
//! ```
//! use stagecast::pipeline::{PipelineRun, RunId, StageCatalog, StageState};
//!
//! let catalog = StageCatalog::labeling_pipeline();
//! let run = PipelineRun::new(RunId::new("task-42"), &catalog);
//!
//! assert_eq!(run.stages.len(), 6);
//! assert_eq!(run.state_of("router"), Some(StageState::Pending));
//! ```

pub mod catalog;
pub mod run;

// Re-export main types
pub use catalog::{DisplayVariants, Stage, StageCatalog};
pub use run::{
    PipelineRun, ProgressSample, RunId, RunOutcome, SampleSource, StageState, StageStatus,
    RUNNING_PROGRESS_CAP, SIMULATED_PROGRESS_CAP,
};
