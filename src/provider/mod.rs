//! Remote task-status providers
//!
//! The reconciliation engine only needs to ask "how is run X doing?".
//! [`HttpStatusProvider`] asks the task manager's HTTP API;
//! [`MockStatusProvider`] replays a script, for tests and demos.

pub mod http;
pub mod mock;
pub mod report;

pub use http::HttpStatusProvider;
pub use mock::{MockResponse, MockStatusProvider};
pub use report::{RemoteStatus, StatusReport, SubmitResponse};

use crate::error::ProgressResult;
use crate::pipeline::RunId;
use async_trait::async_trait;

/// Source of authoritative task status
#[async_trait]
pub trait StatusProvider: Send + Sync {
    /// Fetch the current status of a run
    ///
    /// Errors are treated as transient by the poller: they are logged and
    /// the next scheduled poll tries again.
    async fn fetch_status(&self, run_id: &RunId) -> ProgressResult<StatusReport>;
}
