//! Real-time progress for remote multi-stage pipelines
//!
//! `stagecast` reconciles a locally simulated progress estimate with the
//! authoritative status of a remote task, producing one stage list and one
//! overall percentage that never move backwards.
//!
//! - [`pipeline`]: stage catalog and run state
//! - [`engine`]: simulator, remote poller and the reconciliation controller
//! - [`provider`]: where remote status comes from (HTTP or scripted)
//! - [`clock`]: cancellable periodic timers
//! - [`events`]: serializable run events and recording observers

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod logger;
pub mod pipeline;
pub mod provider;

pub use config::ControllerConfig;
pub use engine::{ReconciliationController, RunHandle, RunObserver};
pub use error::{ProgressError, ProgressResult};
pub use pipeline::{PipelineRun, StageCatalog};
