//! Cancellable periodic timers shared by the simulator and the poller
//!
//! Every timer is a tokio task driven by [`tokio::time::interval`]. The
//! returned [`ClockHandle`] is the only way to stop it: cancelling is
//! idempotent, dropping the handle cancels, and once `cancel` returns the
//! callback is never started again.

use crate::error::{ProgressError, ProgressResult};
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Owned handle to a scheduled timer
#[derive(Debug)]
pub struct ClockHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ClockHandle {
    /// Stop the timer. Safe to call any number of times.
    pub fn cancel(&self) {
        self.token.cancel();
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for ClockHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Factory for periodic timers bound to a tokio runtime
#[derive(Debug, Clone)]
pub struct ProgressClock {
    runtime: Handle,
}

impl ProgressClock {
    /// Bind to the runtime of the calling context
    ///
    /// # Errors
    /// Returns `ProgressError::Internal` when called outside a tokio runtime.
    pub fn current() -> ProgressResult<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            ProgressError::Internal(format!("progress clock needs a tokio runtime: {}", e))
        })?;
        Ok(Self { runtime })
    }

    pub fn with_runtime(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Invoke `callback` every `interval`, first one `interval` from now
    pub fn schedule<F, Fut>(&self, interval: Duration, callback: F) -> ClockHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = Self::period(interval);
        self.spawn(Instant::now() + period, period, callback)
    }

    /// Invoke `callback` right away, then every `interval`
    pub fn schedule_immediate<F, Fut>(&self, interval: Duration, callback: F) -> ClockHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn(Instant::now(), Self::period(interval), callback)
    }

    /// Stop a timer; equivalent to [`ClockHandle::cancel`]
    pub fn cancel(&self, handle: &ClockHandle) {
        handle.cancel();
    }

    // tokio intervals panic on a zero period
    fn period(interval: Duration) -> Duration {
        interval.max(Duration::from_millis(1))
    }

    fn spawn<F, Fut>(&self, start: Instant, period: Duration, mut callback: F) -> ClockHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let task_token = token.clone();

        let task = self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if task_token.is_cancelled() {
                    break;
                }

                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = callback() => {}
                }
            }
        });

        ClockHandle { token, task }
    }
}
