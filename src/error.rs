//! # Kernel Errors
//!
//! Faults the scheduler detects while running a pass, and the error log
//! they are recorded in. Faults never stop the scheduler; they are kept
//! for diagnostics and the system carries on in a degraded (late) mode.

use heapless::Deque;
use thiserror::Error;

use crate::config::{Ticks, ERROR_LOG_DEPTH};
use crate::task::TaskId;

/// Recoverable timing faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KernelFault {
    /// The task ran `elapsed` ticks with less budget left; `overrun` is
    /// the part not covered by its reserve.
    #[error("reserve violation: task {task} ran {elapsed} ticks, {overrun} over budget")]
    ReserveViolation { task: TaskId, elapsed: Ticks, overrun: Ticks },

    /// The task's period countdown underflowed by `overrun` ticks.
    #[error("deadline miss: task {task} late by {overrun} ticks")]
    DeadlineMiss { task: TaskId, overrun: Ticks },
}

impl KernelFault {
    pub fn task(&self) -> TaskId {
        match *self {
            KernelFault::ReserveViolation { task, .. } | KernelFault::DeadlineMiss { task, .. } => task,
        }
    }
}

/// Errors installing a task into the scheduler table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task slot {0} is already in use")]
    SlotOccupied(TaskId),

    #[error("slot 0 is reserved for the idle task")]
    IdleSlotReserved,

    #[error("no free task slot")]
    TableFull,
}

/// Sink for kernel faults. Implementations must not block or fail.
pub trait ErrorLog {
    fn record(&mut self, fault: KernelFault);
}

/// Bounded log keeping the most recent faults plus running totals.
#[derive(Debug, Default)]
pub struct KernelErrorLog {
    recent: Deque<KernelFault, ERROR_LOG_DEPTH>,
    reserve_violations: u32,
    deadline_misses: u32,
}

impl KernelErrorLog {
    pub const fn new() -> Self {
        Self {
            recent: Deque::new(),
            reserve_violations: 0,
            deadline_misses: 0,
        }
    }

    /// Retained faults, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &KernelFault> {
        self.recent.iter()
    }

    pub fn last(&self) -> Option<&KernelFault> {
        self.recent.back()
    }

    pub fn reserve_violations(&self) -> u32 {
        self.reserve_violations
    }

    pub fn deadline_misses(&self) -> u32 {
        self.deadline_misses
    }

    /// Drop retained faults. Totals are kept.
    pub fn clear(&mut self) {
        self.recent.clear();
    }
}

impl ErrorLog for KernelErrorLog {
    fn record(&mut self, fault: KernelFault) {
        match fault {
            KernelFault::ReserveViolation { .. } => self.reserve_violations += 1,
            KernelFault::DeadlineMiss { .. } => self.deadline_misses += 1,
        }
        if self.recent.is_full() {
            self.recent.pop_front();
        }
        let _ = self.recent.push_back(fault);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(slot: usize) -> TaskId {
        TaskId::new(slot).unwrap()
    }

    #[test]
    fn test_counts_per_kind() {
        let mut log = KernelErrorLog::new();
        log.record(KernelFault::DeadlineMiss { task: id(1), overrun: 7 });
        log.record(KernelFault::ReserveViolation { task: id(2), elapsed: 20, overrun: 10 });
        log.record(KernelFault::DeadlineMiss { task: id(3), overrun: 1 });

        assert_eq!(log.deadline_misses(), 2);
        assert_eq!(log.reserve_violations(), 1);
        assert_eq!(log.last().map(KernelFault::task), Some(id(3)));
    }

    #[test]
    fn test_ring_drops_oldest() {
        let mut log = KernelErrorLog::new();
        for n in 0..(ERROR_LOG_DEPTH as Ticks + 4) {
            log.record(KernelFault::DeadlineMiss { task: id(1), overrun: n });
        }

        assert_eq!(log.iter().count(), ERROR_LOG_DEPTH);
        assert_eq!(
            log.iter().next(),
            Some(&KernelFault::DeadlineMiss { task: id(1), overrun: 4 })
        );
        assert_eq!(log.deadline_misses(), ERROR_LOG_DEPTH as u32 + 4);

        log.clear();
        assert!(log.last().is_none());
        assert_eq!(log.deadline_misses(), ERROR_LOG_DEPTH as u32 + 4);
    }

    #[test]
    fn test_fault_display() {
        use std::string::ToString;

        let fault = KernelFault::DeadlineMiss { task: id(4), overrun: 3 };
        assert_eq!(fault.to_string(), "deadline miss: task 4 late by 3 ticks");
    }
}
