//! # Task Control Block
//!
//! The per-slot scheduling record and the small state machines that act
//! on a single TCB: suspension resolution, budget charging, countdown
//! decay and promotion. The scheduler sequences these across the table;
//! everything here touches exactly one task.

use core::fmt;

use crate::config::{Ticks, EVENT_SUSPENDED_MARK, IDLE_PRIORITY, MAX_TASKS, STACK_SIZE};

// ---------------------------------------------------------------------------
// Task identity
// ---------------------------------------------------------------------------

/// Slot identity. A `TaskId` is always a valid index into the task table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u8);

impl TaskId {
    /// The idle task always lives in slot 0.
    pub const IDLE: TaskId = TaskId(0);

    /// Returns `None` when `slot` is outside the task table.
    pub const fn new(slot: usize) -> Option<Self> {
        if slot < MAX_TASKS {
            Some(TaskId(slot as u8))
        } else {
            None
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_idle(self) -> bool {
        self.0 == Self::IDLE.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task entry point. Tasks never return.
pub type TaskEntry = extern "C" fn() -> !;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Scheduling state of a task.
///
/// ```text
///                 suspend_flag / budget exhausted
///   ┌─────────┐ ─────────────────────────────────► ┌───────────┐
///   │  Ready  │                                    │ Suspended │
///   └─────────┘ ◄───────────────────────────────── └───────────┘
///        │          next_wakeup reached 0
///        │ suspend_flag + event wait     ┌────────────────┐
///        └─────────────────────────────► │ EventSuspended │ (woken by the event layer)
///                                        └────────────────┘
///   Finished is terminal and only ever observed.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Eligible for selection.
    Ready,
    /// Waiting for its `next_wakeup` countdown.
    Suspended,
    /// Waiting on an event or resource; countdowns alone do not wake it.
    EventSuspended,
    /// Done for good; skipped by every scheduling phase.
    Finished,
}

// ---------------------------------------------------------------------------
// Task configuration (immutable after installation)
// ---------------------------------------------------------------------------

/// Static timing parameters of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskConfig {
    /// Static priority, higher is more important. Fixed-priority mode only.
    pub priority: u8,

    /// Nominal inter-activation interval in ticks.
    pub period: Ticks,

    /// CPU ticks granted per period. `0` leaves the task unsupervised.
    pub cpu_reserve: Ticks,

    /// Ticks before the first activation. `0` starts the task Ready.
    pub offset: Ticks,
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Per-task counters kept by the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    /// Times the scheduler switched to this task from another one.
    pub swapped_in: u32,
    /// Passes that found the task over its remaining budget.
    pub reserve_violations: u32,
    /// Period countdowns that underflowed.
    pub deadline_misses: u32,
    /// Period boundaries reached on time.
    pub periods: u32,
}

// ---------------------------------------------------------------------------
// Pass outcomes
// ---------------------------------------------------------------------------

/// Result of charging elapsed ticks against a task's reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charge {
    /// Task is unsupervised, idle, or not running; nothing was charged.
    Exempt,
    /// Budget covered the elapsed ticks.
    Within { remaining: Ticks },
    /// Elapsed ticks exceeded what was left; budget clamped to zero.
    Overrun { overrun: Ticks },
}

/// How a period countdown moved during one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodAdvance {
    /// Still counting down.
    Running,
    /// Landed exactly on the boundary; reloaded with `period`.
    Boundary,
    /// Countdown underflowed by `overrun` ticks; reloaded with `period`.
    Missed { overrun: Ticks },
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB).
///
/// TCBs live in the scheduler's fixed table; an empty (`None`) slot is a
/// disabled task. The saved stack pointer points into a [`TaskStack`]
/// owned outside the table.
#[derive(Debug, Clone, Copy)]
pub struct TaskControlBlock {
    /// Slot this TCB occupies.
    pub id: TaskId,
    /// Current scheduling state.
    pub state: TaskState,
    /// Static priority; higher wins in fixed-priority mode.
    pub priority: u8,
    /// Nominal inter-activation interval, reloaded at every boundary.
    pub period: Ticks,

    /// Ticks until the current period boundary. Also the deadline
    /// distance used by earliest-deadline selection.
    pub next_period: Ticks,

    /// Ticks until a suspended task becomes eligible again.
    pub next_wakeup: Ticks,

    /// CPU ticks granted per period; `0` means unsupervised.
    pub cpu_reserve: Ticks,
    /// Budget left in the current period.
    pub cpu_remaining: Ticks,

    /// Set by kernel services that want the task off the CPU.
    pub suspend_flag: bool,
    /// Non-zero while the task waits on an event; `EVENT_SUSPENDED_MARK`
    /// for resource waits.
    pub event_suspend: u8,
    /// Event wait carries a timeout ("no-wait" suspend).
    pub nw_flag: bool,

    /// Address the prepared stack frame returns to on first dispatch.
    pub entry: TaskEntry,

    /// Saved process stack pointer, updated on every context switch.
    pub stack_pointer: *mut u32,

    pub stats: TaskStats,
}

// Safety: `stack_pointer` points into a `'static` TaskStack reserved for
// this task and is only dereferenced by the context-switch code, which
// runs with interrupts masked.
unsafe impl Send for TaskControlBlock {}

impl TaskControlBlock {
    /// Build a TCB for slot `id` in its initial state.
    pub fn new(id: TaskId, config: TaskConfig, entry: TaskEntry, stack_pointer: *mut u32) -> Self {
        let (state, next_wakeup, next_period) = if config.offset == 0 {
            (TaskState::Ready, config.period, config.period)
        } else {
            (TaskState::Suspended, config.offset, config.offset)
        };

        Self {
            id,
            state,
            priority: config.priority,
            period: config.period,
            next_period,
            next_wakeup,
            cpu_reserve: config.cpu_reserve,
            cpu_remaining: config.cpu_reserve,
            suspend_flag: false,
            event_suspend: 0,
            nw_flag: false,
            entry,
            stack_pointer,
            stats: TaskStats::default(),
        }
    }

    /// The idle task: slot 0, lowest priority, no period, no reserve.
    pub fn idle(entry: TaskEntry, stack_pointer: *mut u32) -> Self {
        let config = TaskConfig {
            priority: IDLE_PRIORITY,
            period: 0,
            cpu_reserve: 0,
            offset: 0,
        };
        Self::new(TaskId::IDLE, config, entry, stack_pointer)
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.id.is_idle()
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == TaskState::Ready
    }

    /// Ask the scheduler to take this task off the CPU until its next
    /// period (plain suspension, no event wait).
    pub fn request_suspend(&mut self) {
        self.suspend_flag = true;
        self.event_suspend = 0;
        self.nw_flag = false;
    }

    /// Resolve the state a task that raised `suspend_flag` moves to.
    ///
    /// Returns `None` when there is nothing to resolve (flag clear, or the
    /// task already finished).
    pub fn resolve_suspension(&mut self) -> Option<TaskState> {
        if !self.suspend_flag || self.state == TaskState::Finished {
            return None;
        }

        self.state = if self.event_suspend == EVENT_SUSPENDED_MARK {
            TaskState::EventSuspended
        } else if self.event_suspend > 0 && !self.nw_flag {
            TaskState::EventSuspended
        } else if self.event_suspend > 0 {
            TaskState::Suspended
        } else {
            self.event_suspend = 0;
            self.nw_flag = false;
            TaskState::Suspended
        };
        Some(self.state)
    }

    /// Charge `elapsed` ticks against the CPU reserve.
    ///
    /// A task whose budget reaches zero is moved to `Suspended`.
    pub fn charge(&mut self, elapsed: Ticks) -> Charge {
        if self.cpu_reserve == 0
            || self.is_idle()
            || matches!(self.state, TaskState::Suspended | TaskState::Finished)
        {
            return Charge::Exempt;
        }

        let outcome = if self.cpu_remaining < elapsed {
            let overrun = elapsed - self.cpu_remaining;
            self.cpu_remaining = 0;
            self.stats.reserve_violations += 1;
            Charge::Overrun { overrun }
        } else {
            self.cpu_remaining -= elapsed;
            Charge::Within { remaining: self.cpu_remaining }
        };

        if self.cpu_remaining == 0 {
            self.state = TaskState::Suspended;
        }
        outcome
    }

    /// Decay the wakeup and period countdowns by `elapsed` ticks.
    ///
    /// The wakeup countdown floors at zero; the period countdown is
    /// reloaded with `period` whenever it reaches or passes zero.
    pub fn advance_countdowns(&mut self, elapsed: Ticks) -> PeriodAdvance {
        self.next_wakeup = self.next_wakeup.saturating_sub(elapsed);

        if self.next_period > elapsed {
            self.next_period -= elapsed;
            PeriodAdvance::Running
        } else if self.next_period == elapsed {
            self.next_period = self.period;
            self.stats.periods += 1;
            PeriodAdvance::Boundary
        } else {
            let overrun = elapsed - self.next_period;
            self.next_period = self.period;
            self.stats.deadline_misses += 1;
            PeriodAdvance::Missed { overrun }
        }
    }

    /// Suspended task whose wakeup countdown has run out.
    #[inline]
    pub fn is_due(&self) -> bool {
        self.state == TaskState::Suspended && self.next_wakeup == 0
    }

    /// Make the task Ready for a new period with a full budget.
    pub fn promote(&mut self) {
        self.state = TaskState::Ready;
        self.cpu_remaining = self.cpu_reserve;
        self.next_wakeup = self.period;
    }
}

// ---------------------------------------------------------------------------
// Task stacks
// ---------------------------------------------------------------------------

const STACK_WORDS: usize = STACK_SIZE / 4;

/// Hardware-stacked (8) plus software-saved (8) registers.
const FRAME_WORDS: usize = 16;

/// xPSR with only the Thumb bit set.
const INITIAL_XPSR: u32 = 0x0100_0000;

/// Per-task stack memory, 8-byte aligned as required by the AAPCS.
#[repr(C, align(8))]
pub struct TaskStack([u32; STACK_WORDS]);

impl TaskStack {
    pub const fn new() -> Self {
        Self([0; STACK_WORDS])
    }

    /// Lay down an initial exception frame so that the first context
    /// switch into this stack "returns" to `entry`.
    ///
    /// ## Stack Layout (top = high address, growing down)
    ///
    /// ```text
    /// [Hardware stacked frame]
    ///   xPSR  (Thumb bit set)
    ///   PC    (task entry point)
    ///   LR    (exit trap)
    ///   R12, R3, R2, R1, R0  (0)
    /// [Software saved context]
    ///   R11 .. R4  (0)          <- returned stack pointer
    /// ```
    pub fn prepare(&mut self, entry: TaskEntry, exit: TaskEntry) -> *mut u32 {
        let base = STACK_WORDS - FRAME_WORDS;
        let frame = &mut self.0[base..];

        // R4–R11, then R0–R3, R12
        frame[..13].fill(0);
        frame[13] = exit as usize as u32;
        frame[14] = entry as usize as u32;
        frame[15] = INITIAL_XPSR;

        frame.as_mut_ptr()
    }
}

impl Default for TaskStack {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
