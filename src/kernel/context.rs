//! Execution contexts
//!
//! Each task runs on a fiber: a stackful coroutine with its own stack,
//! mapped once at creation and released when the task exits.
//!
//! Coroutines are asymmetric (a fiber can only suspend back to whoever
//! resumed it), so task-to-task switches go through the dispatcher: the
//! running fiber suspends *naming* the task that should run next, and the
//! dispatcher loop on the host stack resumes that task's fiber.

use super::error::{SchedError, SchedResult};
use super::task::TaskId;
use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};

type TaskYielder = Yielder<(), TaskId>;

/// Smallest stack we hand out, guard page excluded
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Why a resumed fiber gave the thread back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resumed {
    /// The task blocked and named the task to run next
    SwitchTo(TaskId),
    /// The task's entry function returned
    Returned,
}

/// A task's saved machine state plus its dedicated stack
pub(crate) struct Fiber {
    coroutine: Coroutine<(), TaskId, ()>,
}

impl Fiber {
    /// Map a stack and prepare `entry` to run on it
    ///
    /// Nothing runs until the first `resume`. `entry` receives the
    /// capability to suspend this fiber.
    pub fn new<F>(stack_size: usize, entry: F) -> SchedResult<Self>
    where
        F: FnOnce(Suspender) + 'static,
    {
        let stack = DefaultStack::new(stack_size.max(MIN_STACK_SIZE)).map_err(|e| {
            SchedError::StackAllocation {
                reason: e.to_string(),
            }
        })?;

        let coroutine = Coroutine::with_stack(stack, move |yielder: &TaskYielder, _: ()| {
            entry(Suspender {
                yielder: yielder as *const TaskYielder,
            });
        });

        Ok(Self { coroutine })
    }

    /// Run the fiber until it suspends or returns
    pub fn resume(&mut self) -> Resumed {
        match self.coroutine.resume(()) {
            CoroutineResult::Yield(next) => Resumed::SwitchTo(next),
            CoroutineResult::Return(()) => Resumed::Returned,
        }
    }

    pub fn is_done(&self) -> bool {
        self.coroutine.done()
    }
}

/// Capability to suspend the fiber it was issued to
#[derive(Clone, Copy)]
pub(crate) struct Suspender {
    yielder: *const TaskYielder,
}

impl Suspender {
    /// Give the thread back to the dispatcher, asking it to run `next`
    ///
    /// Returns when some switch names this fiber's task again.
    /// Must only be called from the fiber that issued this suspender.
    pub fn suspend(self, next: TaskId) {
        // SAFETY: a Suspender is built from the yielder passed into the
        // fiber body, and callers only use the suspender of the task that
        // currently holds the thread, i.e. from inside that body. The
        // yielder lives on the fiber's stack for the whole body.
        unsafe { (*self.yielder).suspend(next) }
    }
}
