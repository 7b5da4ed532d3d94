//! Scheduler tracing
//!
//! Design:
//! - Ring buffer of recent scheduler events (bounded memory)
//! - Counters for switches, spawns, exits and idle time
//! - Everything serializable so a run can be dumped as JSON

use super::task::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Why the thread moved from one task to another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    /// Joining task handed the thread straight to its target
    Join,
    Sleep,
    ReadChar,
    /// The previous task's entry returned
    Exit,
}

impl std::fmt::Display for SwitchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchReason::Join => write!(f, "join"),
            SwitchReason::Sleep => write!(f, "sleep"),
            SwitchReason::ReadChar => write!(f, "read"),
            SwitchReason::Exit => write!(f, "exit"),
        }
    }
}

/// Trace event kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceKind {
    Spawn { task: TaskId },
    Switch {
        from: TaskId,
        to: TaskId,
        reason: SwitchReason,
    },
    Input { task: TaskId, ch: char },
    Exit { task: TaskId },
    /// Nothing could run; the thread idled until `until`
    Idle { until: u64 },
    Deadlock { blocked: Vec<TaskId> },
}

/// A single trace event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Milliseconds, scheduler clock
    pub timestamp: u64,
    #[serde(flatten)]
    pub kind: TraceKind,
}

/// Scheduler counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub switches: u64,
    pub spawned: u64,
    pub exited: u64,
    pub inputs_delivered: u64,
    pub idle_waits: u64,
    /// Time spent with no runnable task
    pub idle_ms: u64,
}

#[derive(Debug)]
pub struct Tracer {
    capacity: usize,
    events: VecDeque<TraceEvent>,
    pub stats: SchedulerStats,
}

impl Tracer {
    /// A tracer keeping the last `capacity` events; 0 keeps only counters
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity.min(1024)),
            stats: SchedulerStats::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Record an event and bump the matching counter
    pub fn record(&mut self, timestamp: u64, kind: TraceKind) {
        match &kind {
            TraceKind::Spawn { .. } => self.stats.spawned += 1,
            TraceKind::Switch { .. } => self.stats.switches += 1,
            TraceKind::Input { .. } => self.stats.inputs_delivered += 1,
            TraceKind::Exit { .. } => self.stats.exited += 1,
            TraceKind::Idle { until } => {
                self.stats.idle_waits += 1;
                self.stats.idle_ms += until.saturating_sub(timestamp);
            }
            TraceKind::Deadlock { .. } => {}
        }

        if !self.is_enabled() {
            return;
        }
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(TraceEvent { timestamp, kind });
    }

    pub fn events(&self) -> &VecDeque<TraceEvent> {
        &self.events
    }
}

impl std::fmt::Display for SchedulerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Scheduler Statistics ===")?;
        writeln!(f, "Spawned: {}", self.spawned)?;
        writeln!(f, "Exited: {}", self.exited)?;
        writeln!(f, "Switches: {}", self.switches)?;
        writeln!(f, "Inputs delivered: {}", self.inputs_delivered)?;
        write!(f, "Idle: {} waits, {}ms", self.idle_waits, self.idle_ms)
    }
}
