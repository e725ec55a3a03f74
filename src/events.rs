use crate::engine::{RunError, RunObserver};
use crate::pipeline::{PipelineRun, RunId};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// Event names - centralized for consistency
pub mod event_names {
    pub const RUN_SNAPSHOT: &str = "run:snapshot";
    pub const RUN_COMPLETED: &str = "run:completed";
    pub const RUN_FAILED: &str = "run:failed";
}

/// Run state changed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshotEvent {
    pub run_id: RunId,
    pub run: PipelineRun,
    pub timestamp: String,
}

/// Run completed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCompletedEvent {
    pub run_id: Option<RunId>,
    pub timestamp: String,
}

/// Run failed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFailedEvent {
    pub run_id: Option<RunId>,
    pub error: String,
    pub timestamp: String,
}

/// Everything an observer can be told, in a form a UI bus can carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunEvent {
    Snapshot(RunSnapshotEvent),
    Completed(RunCompletedEvent),
    Failed(RunFailedEvent),
}

impl RunEvent {
    pub fn snapshot(run: &PipelineRun) -> Self {
        RunEvent::Snapshot(RunSnapshotEvent {
            run_id: run.run_id.clone(),
            run: run.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn completed(run_id: Option<RunId>) -> Self {
        RunEvent::Completed(RunCompletedEvent {
            run_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn failed(run_id: Option<RunId>, error: &RunError) -> Self {
        RunEvent::Failed(RunFailedEvent {
            run_id,
            error: error.message.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Bus name for this event
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::Snapshot(_) => event_names::RUN_SNAPSHOT,
            RunEvent::Completed(_) => event_names::RUN_COMPLETED,
            RunEvent::Failed(_) => event_names::RUN_FAILED,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunEvent::Snapshot(_))
    }
}

/// Turns observer callbacks into [`RunEvent`]s
///
/// Terminal callbacks carry no run, so the id of the last snapshot is
/// attached to them.
#[derive(Default)]
struct EventTranslator {
    last_run_id: Mutex<Option<RunId>>,
}

impl EventTranslator {
    fn snapshot(&self, run: &PipelineRun) -> RunEvent {
        if let Ok(mut last) = self.last_run_id.lock() {
            *last = Some(run.run_id.clone());
        }
        RunEvent::snapshot(run)
    }

    fn last_run_id(&self) -> Option<RunId> {
        self.last_run_id.lock().ok().and_then(|last| last.clone())
    }

    fn completed(&self) -> RunEvent {
        RunEvent::completed(self.last_run_id())
    }

    fn failed(&self, error: &RunError) -> RunEvent {
        RunEvent::failed(self.last_run_id(), error)
    }
}

/// Observer that records every event it receives
#[derive(Default)]
pub struct EventLog {
    translator: EventTranslator,
    events: Mutex<Vec<RunEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: RunEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every snapshot received, oldest first
    pub fn snapshots(&self) -> Vec<PipelineRun> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RunEvent::Snapshot(snapshot) => Some(snapshot.run),
                _ => None,
            })
            .collect()
    }

    pub fn last_snapshot(&self) -> Option<PipelineRun> {
        self.snapshots().pop()
    }

    pub fn complete_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, RunEvent::Completed(_)))
            .count()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RunEvent::Failed(failed) => Some(failed.error),
                _ => None,
            })
            .collect()
    }

    /// Number of completion and failure events together
    pub fn terminal_count(&self) -> usize {
        self.events().iter().filter(|event| event.is_terminal()).count()
    }
}

impl RunObserver for EventLog {
    fn on_snapshot(&self, run: &PipelineRun) {
        self.push(self.translator.snapshot(run));
    }

    fn on_complete(&self) {
        self.push(self.translator.completed());
    }

    fn on_error(&self, error: &RunError) {
        self.push(self.translator.failed(error));
    }
}

/// Observer that forwards events over a channel
///
/// Lets async consumers `recv().await` run events instead of reacting in
/// callbacks. Events are dropped once the receiver is gone.
pub struct ChannelObserver {
    translator: EventTranslator,
    sender: UnboundedSender<RunEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, UnboundedReceiver<RunEvent>) {
        let (sender, receiver) = unbounded_channel();
        let observer = Self {
            translator: EventTranslator::default(),
            sender,
        };
        (observer, receiver)
    }

    fn send(&self, event: RunEvent) {
        if let Err(e) = self.sender.send(event) {
            debug!("Dropping {} event, receiver closed", e.0.name());
        }
    }
}

impl RunObserver for ChannelObserver {
    fn on_snapshot(&self, run: &PipelineRun) {
        self.send(self.translator.snapshot(run));
    }

    fn on_complete(&self) {
        self.send(self.translator.completed());
    }

    fn on_error(&self, error: &RunError) {
        self.send(self.translator.failed(error));
    }
}
