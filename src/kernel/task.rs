//! Task abstraction
//!
//! A task is a plain closure with its own stack. Tasks never run in parallel:
//! exactly one holds the thread at a time, and it gives the thread away only
//! by blocking (join, sleep, read) or by returning.

use super::context::{Fiber, Suspender};
use serde::{Deserialize, Serialize};

/// Unique identifier for a task
///
/// Handles are dense and never reused: 0 is the host's main flow, spawned
/// tasks get 1, 2, 3, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub usize);

impl TaskId {
    /// The host program's original flow of control
    pub const MAIN: TaskId = TaskId(0);

    pub fn is_main(self) -> bool {
        self == Self::MAIN
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Task execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    /// Created but never switched in
    Ready,
    /// Holds the thread
    Running,
    /// Blocked until `target` exits
    Waiting { target: TaskId },
    /// Blocked until the clock reaches `wake_at` (milliseconds)
    Sleeping { wake_at: u64 },
    /// Blocked until a character arrives
    WaitingForInput,
    /// Entry returned; terminal
    Exited,
}

impl TaskState {
    pub fn is_exited(&self) -> bool {
        matches!(self, TaskState::Exited)
    }

    /// Blocked in one of the three primitives
    pub fn is_blocked(&self) -> bool {
        matches!(
            self,
            TaskState::Waiting { .. } | TaskState::Sleeping { .. } | TaskState::WaitingForInput
        )
    }
}

/// Everything the scheduler knows about one task
pub(crate) struct TaskDescriptor {
    pub id: TaskId,
    pub name: Option<String>,
    pub state: TaskState,
    /// Character handed over by the selector, taken once by `read_char`
    pub pending_input: Option<char>,
    /// Execution context; `None` while the task holds the thread, and after exit
    pub fiber: Option<Fiber>,
    /// Bound by the fiber itself the first time it runs
    pub suspender: Option<Suspender>,
    pub created_at: u64,
    pub exited_at: Option<u64>,
    /// How many times the task was switched in
    pub switches_in: u64,
}

impl TaskDescriptor {
    pub fn new(id: TaskId, name: Option<String>, fiber: Option<Fiber>, now: u64) -> Self {
        Self {
            id,
            name,
            state: TaskState::Ready,
            pending_input: None,
            fiber,
            suspender: None,
            created_at: now,
            exited_at: None,
            switches_in: 0,
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            name: self.name.clone(),
            state: self.state,
            switches_in: self.switches_in,
            created_at: self.created_at,
            exited_at: self.exited_at,
        }
    }
}

/// Point-in-time view of a task, for reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: Option<String>,
    pub state: TaskState,
    pub switches_in: u64,
    pub created_at: u64,
    pub exited_at: Option<u64>,
}
