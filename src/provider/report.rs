use serde::{Deserialize, Serialize};

/// Task status as reported by the remote task manager
///
/// The backend uses `pending`/`processing` while a task is queued or
/// running; both are treated as `Running` by the reconciliation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Pending,
    #[serde(alias = "processing")]
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RemoteStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, RemoteStatus::Pending | RemoteStatus::Running)
    }
}

/// One response of the remote status endpoint
///
/// Accepts both camelCase and the backend's snake_case field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: RemoteStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,

    #[serde(default, alias = "current_step", skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,

    #[serde(default, alias = "completed_steps", skip_serializing_if = "Option::is_none")]
    pub completed_steps: Option<Vec<String>>,

    /// Stage that failed, when the backend can name it
    #[serde(default, alias = "failed_step", skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusReport {
    fn with_status(status: RemoteStatus) -> Self {
        Self {
            status,
            progress: None,
            current_step: None,
            completed_steps: None,
            failed_step: None,
            error: None,
        }
    }

    pub fn running() -> Self {
        Self::with_status(RemoteStatus::Running)
    }

    pub fn completed() -> Self {
        Self::with_status(RemoteStatus::Completed)
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::with_status(RemoteStatus::Failed)
        }
    }

    pub fn cancelled() -> Self {
        Self::with_status(RemoteStatus::Cancelled)
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_current_step(mut self, step: impl Into<String>) -> Self {
        self.current_step = Some(step.into());
        self
    }

    pub fn with_completed_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.completed_steps = Some(steps.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_failed_step(mut self, step: impl Into<String>) -> Self {
        self.failed_step = Some(step.into());
        self
    }
}

/// Response of the upload endpoint
///
/// Asynchronous submissions carry a `task_id` to poll; synchronous ones
/// return the finished result directly and have none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(default, alias = "taskId", skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmitResponse {
    pub fn accepted(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            status: Some("pending".to_string()),
            message: None,
            error: None,
        }
    }

    pub fn synchronous() -> Self {
        Self {
            task_id: None,
            status: None,
            message: None,
            error: None,
        }
    }
}
