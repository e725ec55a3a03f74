use super::observer::{NoopObserver, RunError, RunObserver};
use super::remote::{RemoteProgress, RemoteStatusSource, RemoteUpdate};
use super::simulator::LocalSimulator;
use crate::clock::{ClockHandle, ProgressClock};
use crate::config::ControllerConfig;
use crate::error::{ProgressError, ProgressResult};
use crate::pipeline::{
    PipelineRun, ProgressSample, RunId, SampleSource, StageCatalog, RUNNING_PROGRESS_CAP,
    SIMULATED_PROGRESS_CAP,
};
use crate::provider::{StatusProvider, SubmitResponse};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, warn};

/// An input to the reconciliation step
#[derive(Debug, Clone, PartialEq)]
pub enum ProducerEvent {
    Sample(ProgressSample),
    Remote(RemoteUpdate),
}

impl ProducerEvent {
    fn is_remote(&self) -> bool {
        match self {
            ProducerEvent::Sample(sample) => sample.source == SampleSource::Remote,
            ProducerEvent::Remote(_) => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Live,
    /// Terminal outcome reached and announced
    Finished,
    /// Cancelled by the consumer
    Disposed,
}

/// Something to hand to the observer once the state lock is released
enum Emission {
    Snapshot(PipelineRun),
    Complete,
    Error(RunError),
}

/// State guarded by the run lock; the only writer of `PipelineRun`
struct RunCore {
    run: PipelineRun,
    simulator: LocalSimulator,
    phase: Phase,
    handed_off: bool,
    simulator_clock: Option<ClockHandle>,
    poll_clock: Option<ClockHandle>,
}

impl RunCore {
    fn stop_simulator(&mut self) {
        self.simulator.stop();
        if let Some(clock) = self.simulator_clock.take() {
            clock.cancel();
        }
    }

    fn stop_clocks(&mut self) {
        self.stop_simulator();
        if let Some(clock) = self.poll_clock.take() {
            clock.cancel();
        }
    }

    fn apply(&mut self, event: ProducerEvent) -> Vec<Emission> {
        match event {
            ProducerEvent::Sample(sample) => {
                if self.apply_sample(&sample) {
                    vec![Emission::Snapshot(self.run.clone())]
                } else {
                    Vec::new()
                }
            }
            ProducerEvent::Remote(RemoteUpdate::Progress(progress)) => {
                if self.apply_remote_progress(progress) {
                    vec![Emission::Snapshot(self.run.clone())]
                } else {
                    Vec::new()
                }
            }
            ProducerEvent::Remote(RemoteUpdate::Completed) => {
                self.finish();
                self.run.complete();
                info!(run_id = %self.run.run_id, "Run completed");
                vec![Emission::Snapshot(self.run.clone()), Emission::Complete]
            }
            ProducerEvent::Remote(RemoteUpdate::Failed {
                message,
                failed_stage,
            }) => {
                self.finish();
                if let Some(index) = failed_stage {
                    self.run.fail_stage(index);
                }
                self.run.fail(message.clone());
                warn!(run_id = %self.run.run_id, "Run failed: {}", message);
                vec![
                    Emission::Snapshot(self.run.clone()),
                    Emission::Error(RunError::remote_failure(message)),
                ]
            }
        }
    }

    fn finish(&mut self) {
        self.phase = Phase::Finished;
        self.stop_clocks();
    }

    /// Merge one sample; returns whether the run changed
    fn apply_sample(&mut self, sample: &ProgressSample) -> bool {
        match sample.source {
            SampleSource::Simulated => {
                if self.handed_off {
                    debug!(
                        run_id = %self.run.run_id,
                        timestamp_ms = sample.timestamp_ms,
                        "Dropping simulated sample after handoff"
                    );
                    return false;
                }
                let stages = self.run.advance_to(sample.stage_index);
                let progress = self
                    .run
                    .raise_progress(sample.overall_progress, SIMULATED_PROGRESS_CAP);
                stages || progress
            }
            SampleSource::Remote => {
                let stages = self.run.advance_to(sample.stage_index);
                let progress = self
                    .run
                    .raise_progress(sample.overall_progress, RUNNING_PROGRESS_CAP);
                if sample.overall_progress > 0.0 && !self.handed_off {
                    self.handed_off = true;
                    self.stop_simulator();
                    info!(
                        run_id = %self.run.run_id,
                        progress = sample.overall_progress,
                        "Remote progress arrived, simulation stopped"
                    );
                }
                stages || progress
            }
        }
    }

    fn apply_remote_progress(&mut self, progress: RemoteProgress) -> bool {
        let mut changed = false;
        if let Some(count) = progress.completed_through {
            changed |= self.run.advance_to(count);
        }
        if let Some(index) = progress.current_stage {
            changed |= self.run.advance_to(index);
        }
        if let Some(index) = progress.failed_stage {
            changed |= self.run.fail_stage(index);
        }
        if let Some(sample) = progress.sample {
            changed |= self.apply_sample(&sample);
        }
        changed
    }
}

struct Shared {
    run_id: RunId,
    core: Mutex<RunCore>,
    /// Serializes apply-and-deliver so observers see changes in order
    dispatch: Mutex<()>,
    disposed: AtomicBool,
    observer: Arc<dyn RunObserver>,
}

impl Shared {
    fn ingest(&self, events: Vec<ProducerEvent>) {
        self.apply_with(|core| {
            let mut emissions = Vec::new();
            for event in events {
                if core.phase != Phase::Live {
                    debug!(run_id = %core.run.run_id, "Ignoring event after run ended");
                    break;
                }
                emissions.extend(core.apply(event));
            }
            emissions
        });
    }

    fn on_simulator_tick(&self) {
        self.apply_with(|core| {
            if core.phase != Phase::Live || core.handed_off {
                return Vec::new();
            }
            match core.simulator.tick() {
                Some(sample) => core.apply(ProducerEvent::Sample(sample)),
                None => Vec::new(),
            }
        });
    }

    fn apply_with(&self, step: impl FnOnce(&mut RunCore) -> Vec<Emission>) {
        let Ok(_dispatch) = self.dispatch.lock() else {
            warn!(run_id = %self.run_id, "Dispatch lock poisoned, dropping event");
            return;
        };

        let emissions = {
            let Ok(mut core) = self.core.lock() else {
                warn!(run_id = %self.run_id, "Run lock poisoned, dropping event");
                return;
            };
            if core.phase != Phase::Live {
                return;
            }
            step(&mut *core)
        };

        self.deliver(emissions);
    }

    fn deliver(&self, emissions: Vec<Emission>) {
        for emission in emissions {
            if self.disposed.load(Ordering::SeqCst) {
                return;
            }
            match emission {
                Emission::Snapshot(run) => self.observer.on_snapshot(&run),
                Emission::Complete => self.observer.on_complete(),
                Emission::Error(error) => self.observer.on_error(&error),
            }
        }
    }

    fn cancel(&self) {
        let Ok(mut core) = self.core.lock() else {
            self.disposed.store(true, Ordering::SeqCst);
            return;
        };
        if core.phase != Phase::Live {
            return;
        }
        core.phase = Phase::Disposed;
        self.disposed.store(true, Ordering::SeqCst);
        core.stop_clocks();
        info!(
            run_id = %core.run.run_id,
            progress = core.run.overall_progress,
            "Run cancelled"
        );
    }

    fn snapshot(&self) -> ProgressResult<PipelineRun> {
        Ok(self.core.lock()?.run.clone())
    }

    /// Keep a freshly scheduled clock unless the run already moved on
    fn attach_clock(&self, handle: ClockHandle, simulator: bool) {
        let Ok(mut core) = self.core.lock() else {
            handle.cancel();
            return;
        };
        let wanted = core.phase == Phase::Live && !(simulator && core.handed_off);
        if !wanted {
            handle.cancel();
        } else if simulator {
            core.simulator_clock = Some(handle);
        } else {
            core.poll_clock = Some(handle);
        }
    }
}

/// Cloneable, non-owning handle to a run
///
/// Safe to use from inside observer callbacks. Operations on a run whose
/// controller has been dropped are no-ops.
#[derive(Clone)]
pub struct RunHandle {
    shared: Weak<Shared>,
}

impl RunHandle {
    pub fn cancel(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.cancel();
        }
    }

    pub fn snapshot(&self) -> Option<PipelineRun> {
        self.shared.upgrade().and_then(|s| s.snapshot().ok())
    }
}

/// Owner of one pipeline run
///
/// Starts the local simulation and the remote poller on construction,
/// funnels both through a single merge step, and stops every timer on a
/// terminal outcome, on [`cancel`](Self::cancel), or on drop.
///
/// # Example
/// ```no_run
/// use stagecast::engine::{CallbackObserver, ReconciliationController};
/// use stagecast::provider::HttpStatusProvider;
/// use std::sync::Arc;
///
/// # async fn demo() -> stagecast::error::ProgressResult<()> {
/// let provider = Arc::new(HttpStatusProvider::new("http://localhost:5000")?);
/// let observer = CallbackObserver::new()
///     .on_snapshot(|run| println!("{:.0}%", run.overall_progress));
///
/// let controller = ReconciliationController::builder("task-42", provider)
///     .observer(Arc::new(observer))
///     .start()?;
/// # controller.cancel();
/// # Ok(())
/// # }
/// ```
pub struct ReconciliationController {
    shared: Arc<Shared>,
}

impl ReconciliationController {
    pub fn builder(
        run_id: impl Into<RunId>,
        provider: Arc<dyn StatusProvider>,
    ) -> ControllerBuilder {
        ControllerBuilder::new(run_id.into(), provider)
    }

    /// Start a run for an upload response
    ///
    /// A response with a task id starts a polled run. A synchronous response
    /// already carries the result, so its run ends immediately: failed when
    /// the response has an error, completed otherwise.
    pub fn from_submission(
        response: &SubmitResponse,
        provider: Arc<dyn StatusProvider>,
        catalog: StageCatalog,
        config: ControllerConfig,
        observer: Arc<dyn RunObserver>,
    ) -> ProgressResult<Self> {
        match response.task_id.as_deref() {
            Some(task_id) => ControllerBuilder::new(RunId::new(task_id), provider)
                .catalog(catalog)
                .config(config)
                .observer(observer)
                .start(),
            None => {
                let controller = ControllerBuilder::new(RunId::generate(), provider)
                    .catalog(catalog)
                    .config(config)
                    .observer(observer)
                    .build_idle()?;
                let outcome = match response.error.as_deref().map(str::trim) {
                    Some(message) if !message.is_empty() => RemoteUpdate::Failed {
                        message: message.to_string(),
                        failed_stage: None,
                    },
                    _ => RemoteUpdate::Completed,
                };
                controller.ingest(ProducerEvent::Remote(outcome));
                Ok(controller)
            }
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.shared.run_id
    }

    /// Copy of the current run state
    pub fn snapshot(&self) -> ProgressResult<PipelineRun> {
        self.shared.snapshot()
    }

    pub fn handle(&self) -> RunHandle {
        RunHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Whether the run is still accepting samples
    pub fn is_live(&self) -> bool {
        self.shared
            .core
            .lock()
            .map(|core| core.phase == Phase::Live)
            .unwrap_or(false)
    }

    /// Whether authoritative progress has replaced the simulation
    pub fn has_handed_off(&self) -> bool {
        self.shared
            .core
            .lock()
            .map(|core| core.handed_off)
            .unwrap_or(false)
    }

    /// Apply one producer event
    pub fn ingest(&self, event: ProducerEvent) {
        self.shared.ingest(vec![event]);
    }

    /// Apply events that belong to the same reconciliation step
    ///
    /// Remote events are applied before simulated ones, otherwise in the
    /// given order.
    pub fn ingest_batch(&self, mut events: Vec<ProducerEvent>) {
        events.sort_by_key(|event| !event.is_remote());
        self.shared.ingest(events);
    }

    /// Stop all timers and silence the observer
    ///
    /// Idempotent, and a no-op once the run has reached a terminal outcome.
    pub fn cancel(&self) {
        self.shared.cancel();
    }
}

impl Drop for ReconciliationController {
    fn drop(&mut self) {
        self.shared.cancel();
    }
}

/// Builder for [`ReconciliationController`]
pub struct ControllerBuilder {
    run_id: RunId,
    provider: Arc<dyn StatusProvider>,
    catalog: StageCatalog,
    config: ControllerConfig,
    observer: Arc<dyn RunObserver>,
    clock: Option<ProgressClock>,
}

impl ControllerBuilder {
    pub fn new(run_id: RunId, provider: Arc<dyn StatusProvider>) -> Self {
        Self {
            run_id,
            provider,
            catalog: StageCatalog::default(),
            config: ControllerConfig::default(),
            observer: Arc::new(NoopObserver),
            clock: None,
        }
    }

    pub fn catalog(mut self, catalog: StageCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Use a clock bound to a specific runtime
    pub fn clock(mut self, clock: ProgressClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Create the run without starting any timer
    fn build_idle(self) -> ProgressResult<ReconciliationController> {
        self.config
            .validate()
            .map_err(|e| ProgressError::BuilderError(e.to_string()))?;

        let run = PipelineRun::new(self.run_id.clone(), &self.catalog);
        let simulator = LocalSimulator::new(
            self.catalog.len(),
            self.config.step_duration(),
            self.config.tick_interval(),
        );

        let shared = Arc::new(Shared {
            run_id: self.run_id,
            core: Mutex::new(RunCore {
                run,
                simulator,
                phase: Phase::Live,
                handed_off: false,
                simulator_clock: None,
                poll_clock: None,
            }),
            dispatch: Mutex::new(()),
            disposed: AtomicBool::new(false),
            observer: self.observer,
        });

        Ok(ReconciliationController { shared })
    }

    /// Create the run and start the simulator and the poller
    ///
    /// # Errors
    /// Returns `ProgressError::BuilderError` for an invalid config and
    /// `ProgressError::Internal` when no clock was given and the caller is
    /// not inside a tokio runtime.
    pub fn start(mut self) -> ProgressResult<ReconciliationController> {
        let clock = match self.clock.take() {
            Some(clock) => clock,
            None => ProgressClock::current()?,
        };
        let remote = Arc::new(RemoteStatusSource::new(
            self.run_id.clone(),
            self.catalog.clone(),
            Arc::clone(&self.provider),
            self.config.poll_interval(),
        ));
        let tick_interval = self.config.tick_interval();

        let controller = self.build_idle()?;
        let shared = &controller.shared;

        info!(
            run_id = %shared.run_id,
            poll_interval_ms = remote.poll_interval().as_millis() as u64,
            "Starting progress reconciliation"
        );

        let weak = Arc::downgrade(shared);
        let simulator_clock = clock.schedule(tick_interval, move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_simulator_tick();
            }
            std::future::ready(())
        });
        shared.attach_clock(simulator_clock, true);

        let weak = Arc::downgrade(shared);
        let poll_clock = clock.schedule_immediate(remote.poll_interval(), move || {
            let remote = Arc::clone(&remote);
            let weak = weak.clone();
            async move {
                let Some(update) = remote.poll_once().await else {
                    return;
                };
                if let Some(shared) = weak.upgrade() {
                    shared.ingest(vec![ProducerEvent::Remote(update)]);
                }
            }
        });
        shared.attach_clock(poll_clock, false);

        Ok(controller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use crate::pipeline::{RunOutcome, StageState};
    use crate::provider::MockStatusProvider;

    /// Controller with no timers, driven only through `ingest`
    fn idle_controller(log: &Arc<EventLog>) -> ReconciliationController {
        ControllerBuilder::new(
            RunId::new("unit"),
            Arc::new(MockStatusProvider::never_responds()),
        )
        .observer(Arc::clone(log) as Arc<dyn RunObserver>)
        .build_idle()
        .unwrap()
    }

    fn simulated(stage: usize, progress: f64) -> ProducerEvent {
        ProducerEvent::Sample(ProgressSample::simulated(stage, progress, 0))
    }

    fn remote(stage: usize, progress: f64) -> ProducerEvent {
        ProducerEvent::Remote(RemoteUpdate::Progress(RemoteProgress {
            current_stage: Some(stage),
            sample: Some(ProgressSample::remote(stage, progress, 0)),
            ..Default::default()
        }))
    }

    #[test]
    fn test_lower_sample_never_lowers_progress() {
        let log = Arc::new(EventLog::new());
        let controller = idle_controller(&log);

        controller.ingest(simulated(1, 30.0));
        controller.ingest(simulated(1, 20.0));

        let run = controller.snapshot().unwrap();
        assert_eq!(run.overall_progress, 30.0);
        assert_eq!(log.snapshots().len(), 1);
    }

    #[test]
    fn test_simulated_sample_capped() {
        let log = Arc::new(EventLog::new());
        let controller = idle_controller(&log);

        controller.ingest(simulated(5, 100.0));
        assert_eq!(
            controller.snapshot().unwrap().overall_progress,
            SIMULATED_PROGRESS_CAP
        );
    }

    #[test]
    fn test_remote_running_progress_stays_below_100() {
        let log = Arc::new(EventLog::new());
        let controller = idle_controller(&log);

        controller.ingest(remote(5, 100.0));
        let run = controller.snapshot().unwrap();
        assert_eq!(run.overall_progress, RUNNING_PROGRESS_CAP);
        assert_eq!(run.outcome, RunOutcome::Running);
    }

    #[test]
    fn test_handoff_rejects_later_simulated_samples() {
        let log = Arc::new(EventLog::new());
        let controller = idle_controller(&log);

        controller.ingest(remote(1, 20.0));
        assert!(controller.has_handed_off());
        let before = controller.snapshot().unwrap();

        controller.ingest(simulated(4, 80.0));
        assert_eq!(controller.snapshot().unwrap(), before);
        assert_eq!(log.snapshots().len(), 1);
    }

    #[test]
    fn test_zero_remote_progress_keeps_simulation() {
        let log = Arc::new(EventLog::new());
        let controller = idle_controller(&log);

        controller.ingest(ProducerEvent::Remote(RemoteUpdate::Progress(
            RemoteProgress {
                current_stage: Some(1),
                ..Default::default()
            },
        )));
        assert!(!controller.has_handed_off());

        controller.ingest(simulated(2, 35.0));
        let run = controller.snapshot().unwrap();
        assert_eq!(run.overall_progress, 35.0);
        assert_eq!(run.current_stage_index, Some(2));
    }

    #[test]
    fn test_batch_prefers_remote() {
        let log = Arc::new(EventLog::new());
        let controller = idle_controller(&log);

        controller.ingest_batch(vec![simulated(3, 60.0), remote(2, 40.0)]);

        let run = controller.snapshot().unwrap();
        assert_eq!(run.overall_progress, 40.0);
        assert_eq!(run.current_stage_index, Some(2));
    }

    #[test]
    fn test_terminal_transition_happens_once() {
        let log = Arc::new(EventLog::new());
        let controller = idle_controller(&log);

        controller.ingest(ProducerEvent::Remote(RemoteUpdate::Completed));
        controller.ingest(ProducerEvent::Remote(RemoteUpdate::Failed {
            message: "late".to_string(),
            failed_stage: None,
        }));
        controller.ingest(ProducerEvent::Remote(RemoteUpdate::Completed));

        assert_eq!(log.complete_count(), 1);
        assert!(log.error_messages().is_empty());
        let run = controller.snapshot().unwrap();
        assert_eq!(run.outcome, RunOutcome::Completed);
        assert_eq!(run.overall_progress, 100.0);
    }

    #[test]
    fn test_failure_marks_named_stage() {
        let log = Arc::new(EventLog::new());
        let controller = idle_controller(&log);

        controller.ingest(remote(3, 55.0));
        controller.ingest(ProducerEvent::Remote(RemoteUpdate::Failed {
            message: "labeler crashed".to_string(),
            failed_stage: Some(3),
        }));

        let run = controller.snapshot().unwrap();
        assert_eq!(run.outcome, RunOutcome::Failed);
        assert_eq!(run.stage_state(3), Some(StageState::Failed));
        assert_eq!(run.stage_state(4), Some(StageState::Pending));
        assert_eq!(log.error_messages(), vec!["labeler crashed".to_string()]);
    }

    #[test]
    fn test_stage_failure_while_running_is_not_terminal() {
        let log = Arc::new(EventLog::new());
        let controller = idle_controller(&log);

        controller.ingest(ProducerEvent::Remote(RemoteUpdate::Progress(
            RemoteProgress {
                current_stage: Some(2),
                failed_stage: Some(2),
                ..Default::default()
            },
        )));

        let run = controller.snapshot().unwrap();
        assert_eq!(run.stage_state(2), Some(StageState::Failed));
        assert_eq!(run.outcome, RunOutcome::Running);
        assert!(controller.is_live());
    }

    #[test]
    fn test_cancel_silences_observer() {
        let log = Arc::new(EventLog::new());
        let controller = idle_controller(&log);

        controller.ingest(simulated(0, 5.0));
        controller.cancel();
        controller.cancel();
        controller.ingest(simulated(1, 25.0));
        controller.ingest(ProducerEvent::Remote(RemoteUpdate::Completed));

        assert_eq!(log.len(), 1);
        assert!(!controller.is_live());
        assert_eq!(controller.snapshot().unwrap().outcome, RunOutcome::Running);
    }

    #[test]
    fn test_cancel_after_completion_is_noop() {
        let log = Arc::new(EventLog::new());
        let controller = idle_controller(&log);

        controller.ingest(ProducerEvent::Remote(RemoteUpdate::Completed));
        controller.cancel();

        assert_eq!(log.complete_count(), 1);
        assert_eq!(controller.snapshot().unwrap().outcome, RunOutcome::Completed);
    }

    #[test]
    fn test_handle_outlives_controller() {
        let log = Arc::new(EventLog::new());
        let controller = idle_controller(&log);
        let handle = controller.handle();

        assert!(handle.snapshot().is_some());
        drop(controller);
        assert!(handle.snapshot().is_none());
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_with_explicit_clock() {
        let log = Arc::new(EventLog::new());
        let controller = ReconciliationController::builder(
            "clocked",
            Arc::new(MockStatusProvider::never_responds()),
        )
        .clock(ProgressClock::with_runtime(tokio::runtime::Handle::current()))
        .observer(log.clone())
        .start()
        .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        assert_eq!(log.snapshots().len(), 2);
        assert!(controller.is_live());
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let result = ReconciliationController::builder(
            "no-runtime",
            Arc::new(MockStatusProvider::never_responds()),
        )
        .start();
        assert!(matches!(result, Err(ProgressError::Internal(_))));
    }
}
