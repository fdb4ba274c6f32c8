//! # Ready Queue
//!
//! The fixed-priority discipline picks its next task from here. The
//! scheduler only relies on the [`ReadyQueue`] contract; the
//! [`PriorityReadyQueue`] is the statically sized implementation used by
//! the kernel.

use heapless::Vec;

use crate::config::MAX_TASKS;
use crate::task::TaskId;

/// Ordered set of runnable tasks.
pub trait ReadyQueue {
    /// Insert `id`. Adding a task that is already queued is a no-op.
    fn add(&mut self, id: TaskId, priority: u8);

    /// Remove `id` if present.
    fn remove(&mut self, id: TaskId);

    /// Highest-priority task, earliest inserted among equals.
    fn head(&self) -> Option<TaskId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    id: TaskId,
    priority: u8,
}

/// Ready queue kept sorted by descending priority.
#[derive(Debug, Clone, Default)]
pub struct PriorityReadyQueue {
    entries: Vec<Entry, MAX_TASKS>,
}

impl PriorityReadyQueue {
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Queued tasks, head first.
    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.entries.iter().map(|e| e.id)
    }
}

impl ReadyQueue for PriorityReadyQueue {
    fn add(&mut self, id: TaskId, priority: u8) {
        if self.contains(id) {
            return;
        }
        // Behind every entry of equal or higher priority
        let pos = self
            .entries
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(self.entries.len());
        // Ids are unique slot indices, so the queue never exceeds MAX_TASKS
        let _ = self.entries.insert(pos, Entry { id, priority });
    }

    fn remove(&mut self, id: TaskId) {
        if let Some(pos) = self.entries.iter().position(|e| e.id == id) {
            self.entries.remove(pos);
        }
    }

    fn head(&self) -> Option<TaskId> {
        self.entries.first().map(|e| e.id)
    }
}
