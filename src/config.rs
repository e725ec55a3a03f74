use crate::error::{ProgressError, ProgressResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_STEP_DURATION_MS: u64 = 1500;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Timing configuration for a reconciliation run
///
/// Serialized with millisecond fields so it can live next to other front-end
/// settings, e.g. `{"stepDurationMs": 1500, "pollIntervalMs": 2000}`. Missing
/// fields fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    /// Nominal time the simulator budgets for each stage
    pub step_duration_ms: u64,

    /// Simulator sampling granularity
    pub tick_interval_ms: u64,

    /// Spacing between remote status polls
    pub poll_interval_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            step_duration_ms: DEFAULT_STEP_DURATION_MS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl ControllerConfig {
    pub fn builder() -> ControllerConfigBuilder {
        ControllerConfigBuilder::new()
    }

    pub fn step_duration(&self) -> Duration {
        Duration::from_millis(self.step_duration_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check that every interval is usable
    ///
    /// # Errors
    /// Returns `ProgressError::InvalidConfig` naming the first zero field.
    pub fn validate(&self) -> ProgressResult<()> {
        let fields = [
            ("stepDurationMs", self.step_duration_ms),
            ("tickIntervalMs", self.tick_interval_ms),
            ("pollIntervalMs", self.poll_interval_ms),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(ProgressError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> ProgressResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> ProgressResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}

/// Fluent builder for [`ControllerConfig`]
///
/// # Example
/// ```
/// use stagecast::config::ControllerConfig;
///
/// let config = ControllerConfig::builder()
///     .step_duration_ms(1000)
///     .poll_interval_ms(500)
///     .build()
///     .unwrap();
///
/// assert_eq!(config.tick_interval_ms, 50);
/// ```
#[derive(Debug, Default)]
pub struct ControllerConfigBuilder {
    step_duration_ms: Option<u64>,
    tick_interval_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
}

impl ControllerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step_duration_ms(mut self, ms: u64) -> Self {
        self.step_duration_ms = Some(ms);
        self
    }

    pub fn tick_interval_ms(mut self, ms: u64) -> Self {
        self.tick_interval_ms = Some(ms);
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = Some(ms);
        self
    }

    /// Build the config, defaulting unset fields
    ///
    /// # Errors
    /// Returns `ProgressError::BuilderError` if an interval is zero or the
    /// tick is coarser than a whole stage.
    pub fn build(self) -> ProgressResult<ControllerConfig> {
        let config = ControllerConfig {
            step_duration_ms: self.step_duration_ms.unwrap_or(DEFAULT_STEP_DURATION_MS),
            tick_interval_ms: self.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        };

        config
            .validate()
            .map_err(|e| ProgressError::BuilderError(e.to_string()))?;

        if config.tick_interval_ms > config.step_duration_ms {
            return Err(ProgressError::BuilderError(format!(
                "tick interval ({} ms) is longer than a stage ({} ms)",
                config.tick_interval_ms, config.step_duration_ms
            )));
        }

        Ok(config)
    }
}
