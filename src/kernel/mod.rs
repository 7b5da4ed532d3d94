//! The kernel - task registry, context switching and scheduling
//!
//! One kernel exists per `Scheduler::run`, parked in a thread-local slot for
//! the duration of the run so that tasks (plain closures) can reach it
//! through the free functions in `syscall`. The slot is only ever borrowed
//! between switches, never across one.

pub mod config;
pub(crate) mod context;
pub mod error;
pub mod executor;
pub(crate) mod registry;
pub(crate) mod selector;
pub mod syscall;
pub mod task;
pub mod trace;

pub use config::SchedConfig;
pub use error::{SchedError, SchedResult};
pub use executor::{RunReport, Scheduler, Shutdown};
pub use task::{TaskId, TaskSnapshot, TaskState};

use crate::platform::{Clock, InputSource};
use context::Suspender;
use registry::Registry;
use selector::{SelectMode, Selection};
use std::cell::RefCell;
use task::TaskDescriptor;
use trace::{SwitchReason, TraceKind, Tracer};

thread_local! {
    /// The kernel of the scheduler running on this thread, if any
    static KERNEL: RefCell<Option<Kernel>> = const { RefCell::new(None) };
}

/// Scheduler state for one run
pub(crate) struct Kernel {
    registry: Registry,
    clock: Box<dyn Clock>,
    input: Box<dyn InputSource>,
    config: SchedConfig,
    tracer: Tracer,
    started_at: u64,
}

/// Bookkeeping done, thread not yet handed over
pub(crate) struct Handoff {
    pub me: TaskId,
    pub next: TaskId,
    pub suspender: Suspender,
}

impl Handoff {
    /// Give the thread to `next`; returns once something switches back
    pub fn complete(self) {
        if self.next != self.me {
            self.suspender.suspend(self.next);
        }
    }
}

impl Kernel {
    pub fn new(config: SchedConfig, clock: Box<dyn Clock>, input: Box<dyn InputSource>) -> Self {
        let started_at = clock.now_ms();
        Self {
            registry: Registry::new(config.capacity),
            tracer: Tracer::new(config.trace_capacity),
            clock,
            input,
            config,
            started_at,
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Pick the next task, idling while nothing is eligible
    ///
    /// `None` means nothing can ever become eligible in this mode.
    fn select_blocking(&mut self, mode: SelectMode) -> Option<TaskId> {
        loop {
            let now = self.clock.now_ms();
            let selection = selector::select(
                &mut self.registry,
                mode,
                now,
                self.input.as_mut(),
                self.config.input_poll_interval_ms,
            );
            match selection {
                Selection::Task(id) => {
                    if let Ok(task) = self.registry.get(id)
                        && task.state == TaskState::WaitingForInput
                        && let Some(ch) = task.pending_input
                    {
                        self.tracer.record(now, TraceKind::Input { task: id, ch });
                    }
                    return Some(id);
                }
                Selection::Idle { until } => {
                    log::trace!("[sched] nothing runnable, idling until {}ms", until);
                    self.tracer.record(now, TraceKind::Idle { until });
                    self.clock.wait_until(until);
                }
                Selection::Stalled => return None,
            }
        }
    }

    /// Make `to` the running task
    fn switch_to(&mut self, to: TaskId, reason: SwitchReason) {
        let from = self.registry.current();
        if let Ok(task) = self.registry.get_mut(to) {
            task.state = TaskState::Running;
            if from != to {
                task.switches_in += 1;
            }
        }
        self.registry.set_current(to);
        if from != to {
            log::debug!("[sched] {} -> {} ({})", from, to, reason);
            let now = self.now();
            self.tracer.record(now, TraceKind::Switch { from, to, reason });
        }
    }

    /// Park the current task (its blocked state already recorded) and pick
    /// who runs next
    ///
    /// On deadlock the caller is put back to `Running` and gets the error.
    fn block(&mut self, mode: SelectMode, reason: SwitchReason) -> SchedResult<Handoff> {
        let me = self.registry.current();
        let suspender = self.suspender(me)?;
        match self.select_blocking(mode) {
            Some(next) => {
                self.switch_to(next, reason);
                Ok(Handoff {
                    me,
                    next,
                    suspender,
                })
            }
            None => {
                let blocked = self.registry.blocked();
                self.registry.set_state(me, TaskState::Running)?;
                log::warn!("[sched] {} would block forever ({})", me, reason);
                let now = self.now();
                self.tracer.record(
                    now,
                    TraceKind::Deadlock {
                        blocked: blocked.clone(),
                    },
                );
                Err(SchedError::Deadlock { blocked })
            }
        }
    }

    fn suspender(&self, id: TaskId) -> SchedResult<Suspender> {
        self.registry
            .get(id)?
            .suspender
            .ok_or(SchedError::NotRunning)
    }

    fn snapshots(&self) -> Vec<TaskSnapshot> {
        self.registry.iter().map(TaskDescriptor::snapshot).collect()
    }
}

/// Run `f` against this thread's kernel
pub(crate) fn with_kernel<R>(f: impl FnOnce(&mut Kernel) -> R) -> SchedResult<R> {
    KERNEL.with(|slot| {
        let mut slot = slot.borrow_mut();
        let kernel = slot.as_mut().ok_or(SchedError::NotRunning)?;
        Ok(f(kernel))
    })
}

fn is_installed() -> bool {
    KERNEL.with(|slot| slot.borrow().is_some())
}

fn install(kernel: Kernel) -> SchedResult<()> {
    KERNEL.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return Err(SchedError::AlreadyRunning);
        }
        *slot = Some(kernel);
        Ok(())
    })
}

fn uninstall() -> Option<Kernel> {
    KERNEL.with(|slot| slot.borrow_mut().take())
}

/// Called by a fiber the first time it runs
fn bind_suspender(id: TaskId, suspender: Suspender) {
    let bound = with_kernel(|k| {
        k.registry
            .get_mut(id)
            .map(|task| task.suspender = Some(suspender))
    });
    if !matches!(bound, Ok(Ok(()))) {
        log::error!("[sched] {} started outside of its scheduler", id);
    }
}
