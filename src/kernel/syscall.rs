//! System call interface
//!
//! The boundary between task code and the kernel. Tasks are plain
//! closures, so these are free functions that reach the scheduler running
//! on the current thread. Called outside of `Scheduler::run` they fail with
//! `SchedError::NotRunning`.
//!
//! The blocking calls (`join`, `sleep`, `read_char`, `yield_now`) are the
//! only places a task can lose the thread.

use super::error::{SchedError, SchedResult};
use super::selector::{self, SelectMode};
use super::task::{TaskId, TaskState};
use super::trace::{SchedulerStats, SwitchReason};
use super::{Handoff, Kernel, with_kernel};

/// Configures a task before spawning it, like `std::thread::Builder`
#[derive(Debug, Clone, Default)]
pub struct Builder {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name shown in logs and run reports
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Stack size in bytes, instead of the configured default
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Register the task; it first runs when the scheduler selects it
    pub fn spawn<F>(self, entry: F) -> SchedResult<TaskId>
    where
        F: FnOnce() + 'static,
    {
        with_kernel(|k| k.create_task(self.name, self.stack_size, entry))?
    }
}

/// Create a task running `entry`
///
/// Returns its handle; handles count up from 1. Does not switch.
pub fn spawn<F>(entry: F) -> SchedResult<TaskId>
where
    F: FnOnce() + 'static,
{
    Builder::new().spawn(entry)
}

/// Block until `target` has exited
///
/// Returns immediately if it already has. Otherwise the thread goes
/// straight to `target` when it can run right away, or to whichever task
/// the selector picks when it can't.
pub fn join(target: TaskId) -> SchedResult<()> {
    if let Some(handoff) = with_kernel(|k| k.sys_join(target))?? {
        handoff.complete();
    }
    Ok(())
}

/// Block for at least `ms` milliseconds
///
/// Other tasks run meanwhile. The main task is never picked by the
/// selector after sleeping; it comes back only when another task exits or
/// joins it, so a main task sleeping with no other task alive gets
/// `SchedError::Deadlock`.
pub fn sleep(ms: u64) -> SchedResult<()> {
    let handoff = with_kernel(|k| k.sys_sleep(ms))??;
    handoff.complete();
    Ok(())
}

/// Let every other eligible task run once before continuing
pub fn yield_now() -> SchedResult<()> {
    sleep(0)
}

/// Block until a character of input is available, and return it
///
/// Each character goes to exactly one waiting task.
pub fn read_char() -> SchedResult<char> {
    loop {
        let handoff = with_kernel(|k| k.sys_read_char())??;
        let me = handoff.me;
        handoff.complete();
        let delivered = with_kernel(|k| {
            k.registry
                .get_mut(me)
                .ok()
                .and_then(|task| task.pending_input.take())
        })?;
        if let Some(ch) = delivered {
            return Ok(ch);
        }
    }
}

/// Handle of the calling task
pub fn current() -> SchedResult<TaskId> {
    with_kernel(|k| k.registry.current())
}

/// Scheduler clock, in milliseconds
pub fn now_ms() -> SchedResult<u64> {
    with_kernel(|k| k.now())
}

pub fn state(task: TaskId) -> SchedResult<TaskState> {
    with_kernel(|k| k.registry.state(task))?
}

/// Number of tasks created so far, main included
pub fn task_count() -> SchedResult<usize> {
    with_kernel(|k| k.registry.len())
}

pub fn stats() -> SchedResult<SchedulerStats> {
    with_kernel(|k| k.tracer.stats.clone())
}

impl Kernel {
    fn sys_join(&mut self, target: TaskId) -> SchedResult<Option<Handoff>> {
        let me = self.registry.current();
        let target_state = self.registry.state(target)?;
        if target == me {
            return Err(SchedError::SelfJoin { handle: target });
        }
        if target_state.is_exited() {
            return Ok(None);
        }

        self.registry.set_state(me, TaskState::Waiting { target })?;
        if selector::runnable_now(&self.registry, target, self.now()) {
            let suspender = self.suspender(me)?;
            self.switch_to(target, SwitchReason::Join);
            return Ok(Some(Handoff {
                me,
                next: target,
                suspender,
            }));
        }

        // Target is blocked itself; let the selector find someone who can run
        self.block(SelectMode::Exit, SwitchReason::Join).map(Some)
    }

    fn sys_sleep(&mut self, ms: u64) -> SchedResult<Handoff> {
        let me = self.registry.current();
        let wake_at = self.now().saturating_add(ms);
        self.registry
            .set_state(me, TaskState::Sleeping { wake_at })?;
        self.block(SelectMode::Suspend, SwitchReason::Sleep)
    }

    fn sys_read_char(&mut self) -> SchedResult<Handoff> {
        let me = self.registry.current();
        self.registry.set_state(me, TaskState::WaitingForInput)?;
        self.block(SelectMode::Suspend, SwitchReason::ReadChar)
    }
}
