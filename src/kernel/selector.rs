//! Ready-task selection
//!
//! Round robin: the scan starts just after the current task and wraps
//! around, ending with the current task itself. The first eligible
//! candidate wins.
//!
//! Skip rules shared by both modes:
//! - `Exited` tasks never run again
//! - `Sleeping` tasks whose deadline is still in the future
//! - `Waiting` tasks whose target has not exited
//! - `WaitingForInput` tasks, unless one poll of the input source yields a
//!   character, which is then handed to that task and nobody else
//!
//! Suspend mode (sleep, read) additionally never picks the main task: main
//! only regains the thread through exit-mode selection or a direct switch
//! from `join`.

use super::registry::Registry;
use super::task::{TaskId, TaskState};
use crate::platform::InputSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SelectMode {
    /// After a task returned, and for joins on a target that can't run yet
    Exit,
    /// For sleep and read
    Suspend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Selection {
    /// Switch to this task
    Task(TaskId),
    /// Nothing is eligible yet; scan again at `until` at the latest
    Idle { until: u64 },
    /// Nothing can ever become eligible
    Stalled,
}

/// One full round-robin scan
pub(crate) fn select(
    registry: &mut Registry,
    mode: SelectMode,
    now: u64,
    input: &mut dyn InputSource,
    poll_interval_ms: u64,
) -> Selection {
    let count = registry.len();
    let start = registry.current().0;
    let mut next_wake: Option<u64> = None;
    let mut awaits_input = false;

    for step in 1..=count {
        let id = TaskId((start + step) % count);
        if mode == SelectMode::Suspend && id.is_main() {
            continue;
        }

        let Ok(state) = registry.state(id) else {
            continue;
        };

        match state {
            TaskState::Exited => {}
            TaskState::Sleeping { wake_at } if wake_at > now => {
                next_wake = Some(next_wake.map_or(wake_at, |w| w.min(wake_at)));
            }
            TaskState::Waiting { target } => {
                if target_exited(registry, target) {
                    return Selection::Task(id);
                }
            }
            TaskState::WaitingForInput => match input.poll_char() {
                Some(ch) => {
                    if let Ok(task) = registry.get_mut(id) {
                        task.pending_input = Some(ch);
                    }
                    return Selection::Task(id);
                }
                None => {
                    if !input.is_exhausted() {
                        awaits_input = true;
                    }
                }
            },
            TaskState::Ready | TaskState::Running | TaskState::Sleeping { .. } => {
                return Selection::Task(id);
            }
        }
    }

    let input_deadline = awaits_input.then(|| now + poll_interval_ms.max(1));
    match (next_wake, input_deadline) {
        (None, None) => Selection::Stalled,
        (Some(wake), None) => Selection::Idle { until: wake },
        (None, Some(poll)) => Selection::Idle { until: poll },
        (Some(wake), Some(poll)) => Selection::Idle {
            until: wake.min(poll),
        },
    }
}

/// Can `id` be switched to right now without consulting the input source?
pub(crate) fn runnable_now(registry: &Registry, id: TaskId, now: u64) -> bool {
    match registry.state(id) {
        Ok(TaskState::Ready) => true,
        Ok(TaskState::Sleeping { wake_at }) => wake_at <= now,
        Ok(TaskState::Waiting { target }) => target_exited(registry, target),
        _ => false,
    }
}

fn target_exited(registry: &Registry, target: TaskId) -> bool {
    registry.state(target).map(|s| s.is_exited()).unwrap_or(true)
}
