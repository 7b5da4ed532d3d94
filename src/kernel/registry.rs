//! Task registry
//!
//! Owns every task descriptor. Backed by a slab that only ever grows, so
//! slab keys double as task handles and are never reused.

use super::error::{SchedError, SchedResult};
use super::task::{TaskDescriptor, TaskId, TaskState};
use slab::Slab;

pub(crate) struct Registry {
    tasks: Slab<TaskDescriptor>,
    capacity: usize,
    /// Task holding the thread
    current: TaskId,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            tasks: Slab::with_capacity(capacity.min(1024)),
            capacity,
            current: TaskId::MAIN,
        }
    }

    /// Handle the next `insert` will return
    pub fn next_id(&self) -> SchedResult<TaskId> {
        if self.tasks.len() >= self.capacity {
            return Err(SchedError::CapacityExhausted {
                capacity: self.capacity,
            });
        }
        Ok(TaskId(self.tasks.vacant_key()))
    }

    /// Add a descriptor built for `next_id()`
    pub fn insert(&mut self, desc: TaskDescriptor) -> SchedResult<TaskId> {
        let expected = self.next_id()?;
        debug_assert_eq!(desc.id, expected);
        let key = self.tasks.insert(desc);
        Ok(TaskId(key))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn current(&self) -> TaskId {
        self.current
    }

    pub fn set_current(&mut self, id: TaskId) {
        self.current = id;
    }

    pub fn get(&self, id: TaskId) -> SchedResult<&TaskDescriptor> {
        self.tasks
            .get(id.0)
            .ok_or(SchedError::InvalidHandle { handle: id })
    }

    pub fn get_mut(&mut self, id: TaskId) -> SchedResult<&mut TaskDescriptor> {
        self.tasks
            .get_mut(id.0)
            .ok_or(SchedError::InvalidHandle { handle: id })
    }

    pub fn state(&self, id: TaskId) -> SchedResult<TaskState> {
        self.get(id).map(|t| t.state)
    }

    pub fn set_state(&mut self, id: TaskId, state: TaskState) -> SchedResult<()> {
        let task = self.get_mut(id)?;
        debug_assert!(!task.state.is_exited(), "{} left Exited", id);
        task.state = state;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.tasks.iter().map(|(_, t)| t)
    }

    /// Blocked tasks, for deadlock reports
    pub fn blocked(&self) -> Vec<TaskId> {
        self.iter()
            .filter(|t| t.state.is_blocked())
            .map(|t| t.id)
            .collect()
    }
}
