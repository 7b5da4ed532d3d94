//! Scheduler error types

use super::task::TaskId;
use std::fmt;

/// Scheduler result type
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors reported by the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedError {
    /// The task table is full
    CapacityExhausted { capacity: usize },
    /// The handle was never issued by this scheduler
    InvalidHandle { handle: TaskId },
    /// A task tried to join itself
    SelfJoin { handle: TaskId },
    /// No task can ever become ready again
    Deadlock { blocked: Vec<TaskId> },
    /// Called outside of `Scheduler::run`
    NotRunning,
    /// A scheduler is already running on this thread
    AlreadyRunning,
    /// The stack for a new task could not be mapped
    StackAllocation { reason: String },
    /// Invalid configuration
    Config(String),
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::CapacityExhausted { capacity } => {
                write!(f, "task table full ({} tasks)", capacity)
            }
            SchedError::InvalidHandle { handle } => write!(f, "no such task: {}", handle),
            SchedError::SelfJoin { handle } => write!(f, "{} cannot join itself", handle),
            SchedError::Deadlock { blocked } => {
                let names: Vec<String> = blocked.iter().map(|t| t.to_string()).collect();
                write!(f, "deadlock: no task can become ready (blocked: {})", names.join(", "))
            }
            SchedError::NotRunning => write!(f, "no scheduler is running on this thread"),
            SchedError::AlreadyRunning => write!(f, "a scheduler is already running on this thread"),
            SchedError::StackAllocation { reason } => {
                write!(f, "failed to allocate task stack: {}", reason)
            }
            SchedError::Config(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for SchedError {}
