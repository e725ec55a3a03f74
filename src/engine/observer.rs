use crate::pipeline::PipelineRun;
use std::fmt;

/// Category of a surfaced run error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunErrorKind {
    /// The remote pipeline reported a terminal failure
    RemoteFailure,
}

/// Error surfaced to observers, at most once per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    pub kind: RunErrorKind,
    pub message: String,
}

impl RunError {
    pub fn remote_failure(message: impl Into<String>) -> Self {
        Self {
            kind: RunErrorKind::RemoteFailure,
            message: message.into(),
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RunError {}

/// Receiver of run state, implemented by presentation code
///
/// Calls arrive in order: any number of snapshots, then at most one of
/// `on_complete` / `on_error`, which always follows the final snapshot.
/// Observers may cancel the run through a [`RunHandle`](super::RunHandle)
/// from inside a callback, but must not feed events back into the
/// controller that is calling them.
pub trait RunObserver: Send + Sync {
    /// Called on every accepted state change
    fn on_snapshot(&self, _run: &PipelineRun) {}

    /// Called once when the run completes successfully
    fn on_complete(&self) {}

    /// Called once when the run fails
    fn on_error(&self, _error: &RunError) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

type SnapshotFn = Box<dyn Fn(&PipelineRun) + Send + Sync>;
type CompleteFn = Box<dyn Fn() + Send + Sync>;
type ErrorFn = Box<dyn Fn(&RunError) + Send + Sync>;

/// Closure-based observer
///
/// # Example
/// ```
/// use stagecast::engine::CallbackObserver;
///
/// let observer = CallbackObserver::new()
///     .on_snapshot(|run| println!("{:.0}%", run.overall_progress))
///     .on_complete(|| println!("done"))
///     .on_error(|e| eprintln!("failed: {}", e));
/// ```
#[derive(Default)]
pub struct CallbackObserver {
    snapshot: Option<SnapshotFn>,
    complete: Option<CompleteFn>,
    error: Option<ErrorFn>,
}

impl CallbackObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_snapshot(mut self, f: impl Fn(&PipelineRun) + Send + Sync + 'static) -> Self {
        self.snapshot = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&RunError) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}

impl RunObserver for CallbackObserver {
    fn on_snapshot(&self, run: &PipelineRun) {
        if let Some(f) = &self.snapshot {
            f(run);
        }
    }

    fn on_complete(&self) {
        if let Some(f) = &self.complete {
            f();
        }
    }

    fn on_error(&self, error: &RunError) {
        if let Some(f) = &self.error {
            f(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{RunId, StageCatalog};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_callback_observer_dispatch() {
        let snapshots = Arc::new(AtomicUsize::new(0));
        let completions = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));

        let observer = {
            let snapshots = Arc::clone(&snapshots);
            let completions = Arc::clone(&completions);
            let errors = Arc::clone(&errors);
            CallbackObserver::new()
                .on_snapshot(move |_| {
                    snapshots.fetch_add(1, Ordering::SeqCst);
                })
                .on_complete(move || {
                    completions.fetch_add(1, Ordering::SeqCst);
                })
                .on_error(move |_| {
                    errors.fetch_add(1, Ordering::SeqCst);
                })
        };

        let run = PipelineRun::new(RunId::new("r"), &StageCatalog::labeling_pipeline());
        RunObserver::on_snapshot(&observer, &run);
        RunObserver::on_snapshot(&observer, &run);
        RunObserver::on_complete(&observer);
        RunObserver::on_error(&observer, &RunError::remote_failure("boom"));

        assert_eq!(snapshots.load(Ordering::SeqCst), 2);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_partial_callback_observer() {
        let observer = CallbackObserver::new();
        RunObserver::on_complete(&observer);
        RunObserver::on_error(&observer, &RunError::remote_failure("ignored"));
    }

    #[test]
    fn test_run_error_display() {
        let error = RunError::remote_failure("E1");
        assert_eq!(error.kind, RunErrorKind::RemoteFailure);
        assert_eq!(error.to_string(), "E1");
    }
}
