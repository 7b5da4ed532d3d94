//! spindle - cooperative, single-threaded task scheduling
//!
//! Tasks are plain closures with their own stacks. Exactly one runs at a
//! time, on the thread that called `Scheduler::run`, and control changes
//! hands only when the running task blocks:
//! - `join` waits for another task to finish
//! - `sleep` waits for the clock
//! - `read_char` waits for a character of input
//!
//! or when its closure returns. No preemption, no parallelism, no locks.
//!
//! ```ignore
//! use spindle::{Scheduler, join, sleep, spawn};
//!
//! let report = Scheduler::new().run(|| {
//!     let worker = spawn(|| {
//!         sleep(50).unwrap();
//!         println!("worker done");
//!     })
//!     .unwrap();
//!     join(worker).unwrap();
//! })?;
//! ```

pub mod kernel;
pub mod platform;

pub use kernel::syscall::{
    Builder, current, join, now_ms, read_char, sleep, spawn, state, task_count, yield_now,
};
pub use kernel::{
    RunReport, SchedConfig, SchedError, SchedResult, Scheduler, Shutdown, TaskId, TaskSnapshot,
    TaskState,
};
pub use platform::{Clock, InputSource, ManualClock, MonotonicClock, NoInput, ScriptedInput};
