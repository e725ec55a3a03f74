//! Progress reconciliation engine
//!
//! Two producers estimate how far a run has come: the [`LocalSimulator`]
//! advances on a fixed schedule so the user sees movement right away, and
//! the [`RemoteStatusSource`] polls the backend for authoritative status.
//! The [`ReconciliationController`] merges both into one [`PipelineRun`]
//! that only moves forward, hands off to remote data as soon as it carries
//! real progress, and tells a [`RunObserver`] about every change.
//!
//! [`PipelineRun`]: crate::pipeline::PipelineRun
//!
//! # Example
//! ```no_run
//! use stagecast::engine::ReconciliationController;
//! use stagecast::events::EventLog;
//! use stagecast::provider::{MockStatusProvider, StatusReport};
//! use std::sync::Arc;
//!
//! # async fn demo() -> stagecast::error::ProgressResult<()> {
//! let provider = Arc::new(MockStatusProvider::always(StatusReport::completed()));
//! let log = Arc::new(EventLog::new());
//!
//! let controller = ReconciliationController::builder("task-1", provider)
//!     .observer(log.clone())
//!     .start()?;
//!
//! tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//! assert_eq!(log.complete_count(), 1);
//! assert!(!controller.is_live());
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod observer;
pub mod remote;
pub mod simulator;

// Re-export main types
pub use controller::{ControllerBuilder, ProducerEvent, ReconciliationController, RunHandle};
pub use observer::{CallbackObserver, NoopObserver, RunError, RunErrorKind, RunObserver};
pub use remote::{RemoteProgress, RemoteStatusSource, RemoteUpdate};
pub use simulator::LocalSimulator;
