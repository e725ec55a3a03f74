use super::report::StatusReport;
use super::StatusProvider;
use crate::error::{ProgressError, ProgressResult};
use crate::pipeline::RunId;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// One scripted answer of the mock provider
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Answer with a report
    Report(StatusReport),

    /// Fail the fetch like a dropped connection
    NetworkError(String),

    /// Never answer
    Hang,
}

/// Scripted status provider for development and testing
///
/// Responses are replayed in order. Once the script runs out the last
/// response is repeated; an empty script hangs forever, which models a
/// backend that never answers.
pub struct MockStatusProvider {
    script: Mutex<VecDeque<MockResponse>>,
    last: Mutex<Option<MockResponse>>,
    calls: Mutex<Vec<Instant>>,

    /// Simulated network delay in milliseconds
    delay_ms: u64,
}

impl MockStatusProvider {
    pub fn new(script: Vec<MockResponse>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            delay_ms: 0,
        }
    }

    /// Provider whose fetches never resolve
    pub fn never_responds() -> Self {
        Self::new(Vec::new())
    }

    /// Provider that answers every fetch with the same report
    pub fn always(report: StatusReport) -> Self {
        Self::new(vec![MockResponse::Report(report)])
    }

    /// Add a simulated network delay to every answer
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Number of fetches seen so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    /// When each fetch started
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn next_response(&self) -> ProgressResult<MockResponse> {
        let mut script = self.script.lock()?;
        let mut last = self.last.lock()?;

        match script.pop_front() {
            Some(response) => {
                *last = Some(response.clone());
                Ok(response)
            }
            None => Ok(last.clone().unwrap_or(MockResponse::Hang)),
        }
    }
}

#[async_trait]
impl StatusProvider for MockStatusProvider {
    async fn fetch_status(&self, _run_id: &RunId) -> ProgressResult<StatusReport> {
        self.calls.lock()?.push(Instant::now());
        let response = self.next_response()?;

        // Simulate network delay
        if self.delay_ms > 0 {
            sleep(Duration::from_millis(self.delay_ms)).await;
        }

        match response {
            MockResponse::Report(report) => Ok(report),
            MockResponse::NetworkError(message) => Err(ProgressError::Network(message)),
            MockResponse::Hang => std::future::pending().await,
        }
    }
}
