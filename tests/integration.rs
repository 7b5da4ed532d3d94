//! Integration tests for spindle
//!
//! End-to-end scheduling scenarios driven by a manual clock and scripted
//! input, so every run is deterministic and instant.

use spindle::kernel::trace::{SwitchReason, TraceKind};
use spindle::{
    ManualClock, SchedError, Scheduler, ScriptedInput, Shutdown, TaskId, TaskState, join, now_ms,
    read_char, sleep, spawn, yield_now,
};
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn note(log: &Log, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

fn scheduler(clock: &ManualClock) -> Scheduler {
    Scheduler::new().clock(clock.clone())
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_handles_count_up_from_one() {
    let handles = Rc::new(RefCell::new(Vec::new()));
    let out = handles.clone();
    scheduler(&ManualClock::new())
        .run(move || {
            for _ in 0..5 {
                out.borrow_mut().push(spawn(|| {}).unwrap());
            }
        })
        .unwrap();

    let expected: Vec<TaskId> = (1..=5).map(TaskId).collect();
    assert_eq!(*handles.borrow(), expected);
}

#[test]
fn test_join_returns_exactly_once_after_child_finishes() {
    let log = new_log();
    let outer = log.clone();
    let report = scheduler(&ManualClock::new())
        .run(move || {
            let inner = outer.clone();
            let child = spawn(move || note(&inner, "child ran")).unwrap();
            join(child).unwrap();
            note(&outer, "main resumed");
        })
        .unwrap();

    assert_eq!(*log.borrow(), vec!["child ran", "main resumed"]);
    assert_eq!(report.task(TaskId::MAIN).unwrap().switches_in, 2);
    assert_eq!(report.stats.switches, 2);
}

#[test]
fn test_join_on_exited_task_does_not_switch() {
    let switches = Rc::new(RefCell::new((0, 0)));
    let out = switches.clone();
    scheduler(&ManualClock::new())
        .run(move || {
            let child = spawn(|| {}).unwrap();
            join(child).unwrap();
            let before = spindle::kernel::syscall::stats().unwrap().switches;
            join(child).unwrap();
            join(child).unwrap();
            let after = spindle::kernel::syscall::stats().unwrap().switches;
            *out.borrow_mut() = (before, after);
        })
        .unwrap();

    let (before, after) = *switches.borrow();
    assert_eq!(before, after);
}

#[test]
fn test_nested_joins() {
    let log = new_log();
    let outer = log.clone();
    scheduler(&ManualClock::new())
        .run(move || {
            let mid_log = outer.clone();
            let mid = spawn(move || {
                let leaf_log = mid_log.clone();
                let leaf = spawn(move || note(&leaf_log, "leaf")).unwrap();
                join(leaf).unwrap();
                note(&mid_log, "mid");
            })
            .unwrap();
            join(mid).unwrap();
            note(&outer, "main");
        })
        .unwrap();

    assert_eq!(*log.borrow(), vec!["leaf", "mid", "main"]);
}

// ============================================================================
// Sleeping
// ============================================================================

#[test]
fn test_main_joins_sleeping_task() {
    let clock = ManualClock::new();
    let log = new_log();
    let outer = log.clone();
    let report = scheduler(&clock)
        .run(move || {
            let inner = outer.clone();
            let t1 = spawn(move || {
                note(&inner, "t1 start");
                let start = now_ms().unwrap();
                sleep(50).unwrap();
                let woke = now_ms().unwrap();
                assert!(woke >= start + 50);
                note(&inner, format!("t1 woke at {}", woke));
            })
            .unwrap();
            join(t1).unwrap();
            note(&outer, format!("main resumed at {}", now_ms().unwrap()));
        })
        .unwrap();

    assert_eq!(
        *log.borrow(),
        vec!["t1 start", "t1 woke at 50", "main resumed at 50"]
    );
    assert_eq!(report.outcome, Shutdown::MainReturned);
    assert!(report.all_exited());
    assert_eq!(report.stats.idle_ms, 50);
}

#[test]
fn test_sleepers_wake_in_deadline_order() {
    let clock = ManualClock::new();
    let log = new_log();
    let outer = log.clone();
    scheduler(&clock)
        .run(move || {
            let mut tasks = Vec::new();
            for (name, ms) in [("long", 30), ("short", 10), ("mid", 20)] {
                let inner = outer.clone();
                tasks.push(
                    spawn(move || {
                        sleep(ms).unwrap();
                        note(&inner, format!("{}@{}", name, now_ms().unwrap()));
                    })
                    .unwrap(),
                );
            }
            for t in tasks {
                join(t).unwrap();
            }
        })
        .unwrap();

    assert_eq!(*log.borrow(), vec!["short@10", "mid@20", "long@30"]);
}

#[test]
fn test_sleep_never_returns_early() {
    let clock = ManualClock::new();
    let observed = Rc::new(RefCell::new(Vec::new()));
    let out = observed.clone();
    scheduler(&clock)
        .run(move || {
            let mut tasks = Vec::new();
            for d in [0u64, 1, 7, 33, 100] {
                let out = out.clone();
                tasks.push(
                    spawn(move || {
                        let start = now_ms().unwrap();
                        sleep(d).unwrap();
                        out.borrow_mut().push((start, d, now_ms().unwrap()));
                    })
                    .unwrap(),
                );
            }
            for t in tasks {
                join(t).unwrap();
            }
        })
        .unwrap();

    assert_eq!(observed.borrow().len(), 5);
    for &(start, d, woke) in observed.borrow().iter() {
        assert!(woke >= start + d, "slept {}ms from {} but woke at {}", d, start, woke);
    }
}

#[test]
fn test_yield_round_robin() {
    let log = new_log();
    let outer = log.clone();
    scheduler(&ManualClock::new())
        .run(move || {
            let mut tasks = Vec::new();
            for name in ["a", "b", "c"] {
                let inner = outer.clone();
                tasks.push(
                    spawn(move || {
                        for i in 0..2 {
                            note(&inner, format!("{}{}", name, i));
                            yield_now().unwrap();
                        }
                    })
                    .unwrap(),
                );
            }
            for t in tasks {
                join(t).unwrap();
            }
        })
        .unwrap();

    assert_eq!(*log.borrow(), vec!["a0", "b0", "c0", "a1", "b1", "c1"]);
}

#[test]
fn test_main_sleep_resumes_after_other_task_exits() {
    let clock = ManualClock::new();
    let log = new_log();
    let outer = log.clone();
    scheduler(&clock)
        .run(move || {
            let inner = outer.clone();
            spawn(move || note(&inner, "worker")).unwrap();
            sleep(40).unwrap();
            note(&outer, format!("main awake at {}", now_ms().unwrap()));
        })
        .unwrap();

    assert_eq!(*log.borrow(), vec!["worker", "main awake at 40"]);
}

// ============================================================================
// Input
// ============================================================================

#[test]
fn test_read_char_sequence_in_order() {
    let input = ScriptedInput::new("hello");
    let read = Rc::new(RefCell::new(String::new()));
    let out = read.clone();
    scheduler(&ManualClock::new())
        .input(input.clone())
        .run(move || {
            let t = spawn(move || {
                for _ in 0..5 {
                    out.borrow_mut().push(read_char().unwrap());
                }
            })
            .unwrap();
            join(t).unwrap();
        })
        .unwrap();

    assert_eq!(*read.borrow(), "hello");
    assert_eq!(input.delivered(), 5);
    assert_eq!(input.pending(), 0);
}

#[test]
fn test_two_readers_each_get_one_char() {
    let input = ScriptedInput::new("ab");
    let got = Rc::new(RefCell::new(Vec::new()));
    let out = got.clone();
    let report = scheduler(&ManualClock::new())
        .input(input)
        .run(move || {
            let mut tasks = Vec::new();
            for _ in 0..2 {
                let out = out.clone();
                tasks.push(
                    spawn(move || {
                        let me = spindle::current().unwrap();
                        let ch = read_char().unwrap();
                        out.borrow_mut().push((me, ch));
                    })
                    .unwrap(),
                );
            }
            for t in tasks {
                join(t).unwrap();
            }
        })
        .unwrap();

    // Task 1 blocks first and hands off to task 2; the scan after task 2
    // blocks starts at task 1, so it gets 'a'.
    let mut got = got.borrow().clone();
    got.sort();
    assert_eq!(got, vec![(TaskId(1), 'a'), (TaskId(2), 'b')]);
    assert_eq!(report.stats.inputs_delivered, 2);
}

#[test]
fn test_input_arriving_later_wakes_reader() {
    let clock = ManualClock::new();
    let input = ScriptedInput::new("");
    let feeder = input.clone();
    let got = Rc::new(RefCell::new(None));
    let out = got.clone();
    scheduler(&clock)
        .input(input)
        .run(move || {
            let reader = spawn(move || *out.borrow_mut() = Some(read_char().unwrap())).unwrap();
            let writer = spawn(move || {
                sleep(25).unwrap();
                feeder.push('k');
            })
            .unwrap();
            join(reader).unwrap();
            join(writer).unwrap();
        })
        .unwrap();

    assert_eq!(*got.borrow(), Some('k'));
}

#[test]
fn test_read_on_closed_input_fails_instead_of_hanging() {
    let input = ScriptedInput::new("");
    input.close();
    let result = Rc::new(RefCell::new(None));
    let out = result.clone();
    let report = scheduler(&ManualClock::new())
        .input(input)
        .run(move || {
            let reader = spawn(move || {
                *out.borrow_mut() = Some(read_char());
                assert_eq!(spindle::state(TaskId(1)), Ok(TaskState::Running));
            })
            .unwrap();
            join(reader).unwrap();
        })
        .unwrap();

    // The reader gets the error and runs on; main is still waiting on it
    assert_eq!(
        *result.borrow(),
        Some(Err(SchedError::Deadlock {
            blocked: vec![TaskId::MAIN, TaskId(1)]
        }))
    );
    assert!(report.all_exited());
    assert!(
        report
            .trace
            .iter()
            .any(|e| matches!(e.kind, TraceKind::Deadlock { .. }))
    );
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_all_tasks_exit() {
    let report = scheduler(&ManualClock::new())
        .run(|| {
            let a = spawn(|| sleep(5).unwrap()).unwrap();
            let b = spawn(|| sleep(3).unwrap()).unwrap();
            join(a).unwrap();
            join(b).unwrap();
        })
        .unwrap();

    assert_eq!(report.outcome, Shutdown::MainReturned);
    assert!(report.all_exited());
    assert_eq!(report.stats.exited, 3);
    let last = report.trace.last().unwrap();
    assert_eq!(last.kind, TraceKind::Exit { task: TaskId::MAIN });
}

#[test]
fn test_join_cycle_ends_run() {
    let report = scheduler(&ManualClock::new())
        .run(|| {
            let stuck = spawn(|| {
                let _ = join(TaskId::MAIN);
            })
            .unwrap();
            // Exits last, and nothing is left that can run
            spawn(|| {}).unwrap();
            let _ = join(stuck);
        })
        .unwrap();

    assert_eq!(
        report.outcome,
        Shutdown::NoRunnableTasks {
            blocked: vec![TaskId::MAIN, TaskId(1)]
        }
    );
}

#[test]
fn test_trace_records_switch_reasons() {
    let report = scheduler(&ManualClock::new())
        .run(|| {
            let sleeper = spawn(|| sleep(1).unwrap()).unwrap();
            spawn(|| {}).unwrap();
            join(sleeper).unwrap();
        })
        .unwrap();

    let reasons: Vec<SwitchReason> = report
        .trace
        .iter()
        .filter_map(|e| match e.kind {
            TraceKind::Switch { reason, .. } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(
        reasons,
        vec![
            SwitchReason::Join,
            SwitchReason::Sleep,
            SwitchReason::Exit,
            SwitchReason::Exit
        ]
    );
}
