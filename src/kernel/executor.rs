//! Task lifecycle and the dispatch loop
//!
//! `Scheduler::run` turns the host's closure into the main task (handle 0)
//! and drives every fiber from a dispatch loop on the host's own stack:
//! - a fiber that blocks names its successor, and the loop resumes it
//! - a fiber whose entry returns is finalized here: marked `Exited`, its
//!   stack released, and the exit-mode selection picks who runs next
//!
//! The run ends when the main task returns, or when a task exits and
//! nothing left can ever run.

use super::config::SchedConfig;
use super::context::{Fiber, Resumed};
use super::error::{SchedError, SchedResult};
use super::selector::SelectMode;
use super::task::{TaskDescriptor, TaskId, TaskSnapshot, TaskState};
use super::trace::{SchedulerStats, SwitchReason, TraceEvent, TraceKind};
use super::{Kernel, bind_suspender, install, is_installed, uninstall, with_kernel};
use crate::platform::{Clock, InputSource, MonotonicClock, NoInput};
use serde::{Deserialize, Serialize};

/// A configured scheduler, ready to run
pub struct Scheduler {
    config: SchedConfig,
    clock: Box<dyn Clock>,
    input: Box<dyn InputSource>,
}

impl Scheduler {
    /// Default configuration, real time, no input
    pub fn new() -> Self {
        Self::with_config(SchedConfig::default())
    }

    pub fn with_config(config: SchedConfig) -> Self {
        Self {
            config,
            clock: Box::new(MonotonicClock::new()),
            input: Box::new(NoInput),
        }
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn input(mut self, input: impl InputSource + 'static) -> Self {
        self.input = Box::new(input);
        self
    }

    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    /// Run `main` as task 0 until the run ends
    ///
    /// Returns once `main` returns, or once nothing can run any more.
    /// Tasks still unfinished at that point are dropped, unwinding their
    /// stacks. A panic in any task propagates out of this call.
    pub fn run<F>(self, main: F) -> SchedResult<RunReport>
    where
        F: FnOnce() + 'static,
    {
        self.config.validate()?;
        if is_installed() {
            return Err(SchedError::AlreadyRunning);
        }

        let mut kernel = Kernel::new(self.config, self.clock, self.input);
        let main_id = kernel.create_task(Some("main".into()), None, main)?;
        debug_assert!(main_id.is_main());
        if let Ok(task) = kernel.registry.get_mut(main_id) {
            task.state = TaskState::Running;
            task.switches_in = 1;
        }
        kernel.registry.set_current(main_id);

        install(kernel)?;
        let guard = Installed;
        log::info!("[sched] run started");

        let outcome = dispatch(main_id)?;

        let kernel = guard.finish().ok_or(SchedError::NotRunning)?;
        let report = RunReport::collect(&kernel, outcome);
        let unfinished = report.unfinished();
        if !unfinished.is_empty() {
            log::warn!(
                "[sched] dropping {} unfinished task(s): {:?}",
                unfinished.len(),
                unfinished
            );
        }
        log::info!(
            "[sched] run ended after {}ms ({} switches): {:?}",
            report.elapsed_ms,
            report.stats.switches,
            report.outcome
        );
        drop(kernel);
        Ok(report)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    /// Allocate a descriptor, stack and fiber for `entry`
    ///
    /// The task starts `Ready`; nothing switches.
    pub(crate) fn create_task<F>(
        &mut self,
        name: Option<String>,
        stack_size: Option<usize>,
        entry: F,
    ) -> SchedResult<TaskId>
    where
        F: FnOnce() + 'static,
    {
        let id = self.registry.next_id()?;
        let stack_size = stack_size.unwrap_or(self.config.stack_size);
        let fiber = Fiber::new(stack_size, move |suspender| {
            bind_suspender(id, suspender);
            entry();
        })?;

        let now = self.now();
        self.registry
            .insert(TaskDescriptor::new(id, name, Some(fiber), now))?;
        self.tracer.record(now, TraceKind::Spawn { task: id });
        log::debug!(
            "[sched] spawned {} ({}/{} tasks)",
            id,
            self.registry.len(),
            self.registry.capacity()
        );
        Ok(id)
    }

    /// Retire a task whose entry returned and pick its successor
    fn finalize(&mut self, id: TaskId) -> SchedResult<Option<TaskId>> {
        let now = self.now();
        let task = self.registry.get_mut(id)?;
        task.state = TaskState::Exited;
        task.exited_at = Some(now);
        task.suspender = None;
        self.tracer.record(now, TraceKind::Exit { task: id });
        log::debug!("[sched] {} exited", id);

        if id.is_main() {
            return Ok(None);
        }

        match self.select_blocking(SelectMode::Exit) {
            Some(next) => {
                self.switch_to(next, SwitchReason::Exit);
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }
}

/// Resume fibers until the run is over
fn dispatch(first: TaskId) -> SchedResult<Shutdown> {
    let mut running = first;
    loop {
        let mut fiber = with_kernel(|k| {
            k.registry
                .get_mut(running)
                .ok()
                .and_then(|task| task.fiber.take())
        })?
        .ok_or(SchedError::InvalidHandle { handle: running })?;

        match fiber.resume() {
            Resumed::SwitchTo(next) => {
                with_kernel(|k| {
                    if let Ok(task) = k.registry.get_mut(running) {
                        task.fiber = Some(fiber);
                    }
                })?;
                running = next;
            }
            Resumed::Returned => {
                debug_assert!(fiber.is_done());
                // Release the stack before anything else runs
                drop(fiber);
                match with_kernel(|k| k.finalize(running))?? {
                    Some(next) => running = next,
                    None if running.is_main() => return Ok(Shutdown::MainReturned),
                    None => {
                        let blocked = with_kernel(|k| k.registry.blocked())?;
                        return Ok(Shutdown::NoRunnableTasks { blocked });
                    }
                }
            }
        }
    }
}

/// Owns the thread-local slot for the length of a run
struct Installed;

impl Installed {
    fn finish(self) -> Option<Kernel> {
        std::mem::forget(self);
        uninstall()
    }
}

impl Drop for Installed {
    fn drop(&mut self) {
        if let Some(kernel) = uninstall() {
            if std::thread::panicking() {
                // Unwinding suspended fibers while already unwinding is not
                // sound; leak their stacks instead.
                std::mem::forget(kernel);
            } else {
                drop(kernel);
            }
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Shutdown {
    /// The main task's closure returned
    MainReturned,
    /// A task exited and no remaining task can ever run again
    NoRunnableTasks { blocked: Vec<TaskId> },
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub outcome: Shutdown,
    pub elapsed_ms: u64,
    pub stats: SchedulerStats,
    pub tasks: Vec<TaskSnapshot>,
    pub trace: Vec<TraceEvent>,
}

impl RunReport {
    fn collect(kernel: &Kernel, outcome: Shutdown) -> Self {
        Self {
            outcome,
            elapsed_ms: kernel.now().saturating_sub(kernel.started_at),
            stats: kernel.tracer.stats.clone(),
            tasks: kernel.snapshots(),
            trace: kernel.tracer.events().iter().cloned().collect(),
        }
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskSnapshot> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Tasks that had not exited when the run ended
    pub fn unfinished(&self) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| !t.state.is_exited())
            .map(|t| t.id)
            .collect()
    }

    pub fn all_exited(&self) -> bool {
        self.tasks.iter().all(|t| t.state.is_exited())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
