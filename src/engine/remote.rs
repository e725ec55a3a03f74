use crate::error::ProgressError;
use crate::pipeline::{ProgressSample, RunId, StageCatalog};
use crate::provider::{RemoteStatus, StatusProvider, StatusReport};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

const DEFAULT_FAILURE_MESSAGE: &str = "Remote pipeline failed";
const CANCELLED_MESSAGE: &str = "Task was cancelled";

/// Non-terminal progress extracted from a status report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteProgress {
    /// Length of the contiguous run of completed stages from the start
    pub completed_through: Option<usize>,

    pub current_stage: Option<usize>,

    pub failed_stage: Option<usize>,

    /// Present only when the report carried progress above zero
    pub sample: Option<ProgressSample>,
}

impl RemoteProgress {
    pub fn is_empty(&self) -> bool {
        self.completed_through.is_none()
            && self.current_stage.is_none()
            && self.failed_stage.is_none()
            && self.sample.is_none()
    }
}

/// What one successful poll means for the run
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteUpdate {
    Progress(RemoteProgress),
    Completed,
    Failed {
        message: String,
        failed_stage: Option<usize>,
    },
}

impl RemoteUpdate {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RemoteUpdate::Progress(_))
    }
}

/// Polls the status provider and translates reports into updates
///
/// The source itself holds no mutable state; the controller schedules
/// [`RemoteStatusSource::poll_once`] on a clock and owns the result.
pub struct RemoteStatusSource {
    run_id: RunId,
    catalog: StageCatalog,
    provider: Arc<dyn StatusProvider>,
    poll_interval: Duration,
    started: Instant,
}

impl RemoteStatusSource {
    pub fn new(
        run_id: RunId,
        catalog: StageCatalog,
        provider: Arc<dyn StatusProvider>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            run_id,
            catalog,
            provider,
            poll_interval,
            started: Instant::now(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Fetch once and translate
    ///
    /// A fetch is given at most one poll interval, so a hung request never
    /// holds up the next poll. Failures and timeouts are logged and
    /// swallowed; they yield `None` and the next scheduled poll tries again.
    pub async fn poll_once(&self) -> Option<RemoteUpdate> {
        let fetch = self.provider.fetch_status(&self.run_id);
        let result = match timeout(self.poll_interval, fetch).await {
            Ok(result) => result,
            Err(_) => Err(ProgressError::Timeout(self.poll_interval.as_millis() as u64)),
        };

        match result {
            Ok(report) => {
                let elapsed_ms = self.started.elapsed().as_millis() as u64;
                let update = self.translate(&report, elapsed_ms);
                match &update {
                    RemoteUpdate::Progress(progress) if progress.is_empty() => {
                        debug!(run_id = %self.run_id, "Status report carried no progress");
                    }
                    update if update.is_terminal() => {
                        debug!(
                            run_id = %self.run_id,
                            status = ?report.status,
                            "Remote reported a final status"
                        );
                    }
                    _ => {}
                }
                Some(update)
            }
            Err(e) => {
                warn!(
                    run_id = %self.run_id,
                    transient = e.is_transient(),
                    "Status poll failed, retrying on next tick: {}",
                    e
                );
                None
            }
        }
    }

    /// Map a report onto catalog positions
    pub fn translate(&self, report: &StatusReport, timestamp_ms: u64) -> RemoteUpdate {
        let failed_stage = report
            .failed_step
            .as_deref()
            .and_then(|id| self.lookup(id, "failed_step"));

        match report.status {
            RemoteStatus::Completed => RemoteUpdate::Completed,
            RemoteStatus::Failed => RemoteUpdate::Failed {
                message: failure_message(report, DEFAULT_FAILURE_MESSAGE),
                failed_stage,
            },
            RemoteStatus::Cancelled => RemoteUpdate::Failed {
                message: failure_message(report, CANCELLED_MESSAGE),
                failed_stage,
            },
            RemoteStatus::Pending | RemoteStatus::Running => {
                let completed_through = report
                    .completed_steps
                    .as_ref()
                    .map(|steps| self.completed_prefix(steps))
                    .filter(|count| *count > 0);
                let current_stage = report
                    .current_step
                    .as_deref()
                    .and_then(|id| self.lookup(id, "current_step"));

                let sample = report
                    .progress
                    .filter(|p| p.is_finite() && *p > 0.0)
                    .map(|progress| {
                        let stage_index =
                            current_stage.unwrap_or_else(|| self.stage_for_progress(progress));
                        ProgressSample::remote(stage_index, progress, timestamp_ms)
                    });

                RemoteUpdate::Progress(RemoteProgress {
                    completed_through,
                    current_stage,
                    failed_stage,
                    sample,
                })
            }
        }
    }

    fn lookup(&self, id: &str, field: &str) -> Option<usize> {
        let index = self.catalog.index_of(id);
        if index.is_none() {
            debug!(run_id = %self.run_id, field, stage = id, "Ignoring unknown stage");
        }
        index
    }

    /// Count of catalog stages, from the first, that appear in `steps`
    fn completed_prefix(&self, steps: &[String]) -> usize {
        let reported: HashSet<&str> = steps.iter().map(String::as_str).collect();
        let prefix = self
            .catalog
            .stages()
            .iter()
            .take_while(|stage| reported.contains(stage.id.as_str()))
            .count();

        if prefix < reported.len() {
            debug!(
                run_id = %self.run_id,
                prefix,
                reported = reported.len(),
                "Ignoring out-of-order or unknown completed steps"
            );
        }
        prefix
    }

    /// Stage a bare progress value falls in
    fn stage_for_progress(&self, progress: f64) -> usize {
        let index = (progress / self.catalog.progress_per_stage()).floor() as usize;
        index.min(self.catalog.len() - 1)
    }
}

/// Reported error text, or `fallback` when it is missing or blank
fn failure_message(report: &StatusReport, fallback: &str) -> String {
    report
        .error
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
