//! Scheduler configuration

use super::context::MIN_STACK_SIZE;
use super::error::{SchedError, SchedResult};
use serde::{Deserialize, Serialize};

/// Default upper limit on tasks, main included
pub const DEFAULT_CAPACITY: usize = 128;

/// Default per-task stack size
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

/// Tunables for one scheduler run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedConfig {
    /// Maximum number of tasks, main included
    pub capacity: usize,
    /// Stack size for each task, in bytes
    pub stack_size: usize,
    /// How long to idle before polling input again when only input can
    /// make progress
    pub input_poll_interval_ms: u64,
    /// Events kept in the trace ring buffer; 0 disables tracing
    pub trace_capacity: usize,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            stack_size: DEFAULT_STACK_SIZE,
            input_poll_interval_ms: 1,
            trace_capacity: 1000,
        }
    }
}

impl SchedConfig {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> SchedResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SchedError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `SPINDLE_CAPACITY`, `SPINDLE_STACK_SIZE`,
    /// `SPINDLE_POLL_MS` and `SPINDLE_TRACE`
    pub fn from_env() -> SchedResult<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> SchedResult<Self> {
        let mut config = Self::default();
        if let Some(v) = parse_var(&var, "SPINDLE_CAPACITY")? {
            config.capacity = v as usize;
        }
        if let Some(v) = parse_var(&var, "SPINDLE_STACK_SIZE")? {
            config.stack_size = v as usize;
        }
        if let Some(v) = parse_var(&var, "SPINDLE_POLL_MS")? {
            config.input_poll_interval_ms = v;
        }
        if let Some(v) = parse_var(&var, "SPINDLE_TRACE")? {
            config.trace_capacity = v as usize;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SchedResult<()> {
        if self.capacity == 0 {
            return Err(SchedError::Config(
                "capacity must leave room for the main task".into(),
            ));
        }
        if self.stack_size < MIN_STACK_SIZE {
            return Err(SchedError::Config(format!(
                "stack_size {} is below the minimum of {}",
                self.stack_size, MIN_STACK_SIZE
            )));
        }
        Ok(())
    }
}

fn parse_var(var: &impl Fn(&str) -> Option<String>, name: &str) -> SchedResult<Option<u64>> {
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SchedError::Config(format!("{}={:?} is not a number", name, raw))),
        None => Ok(None),
    }
}
