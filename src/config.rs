//! # rkos Configuration
//!
//! Compile-time constants governing the scheduler and system behavior,
//! plus [`SchedulerConfig`], the one value that carries the build-time
//! scheduling toggles into the core. All limits are fixed at compile
//! time — no dynamic allocation.

/// Scheduler time unit. Every countdown in a TCB is expressed in ticks.
/// Sized to the width of the hardware OS timer compare register.
pub type Ticks = u16;

/// Maximum number of task slots, idle task included.
/// This bounds the static TCB table and the ready queue.
pub const MAX_TASKS: usize = 8;

/// Scheduler tick frequency in Hz.
pub const TICK_HZ: u32 = 1000;

/// Core clock of the LPC1768 as configured by the mbed boot code.
pub const SYSTEM_CLOCK_HZ: u32 = 96_000_000;

/// Core clock cycles in one scheduler tick.
pub const CYCLES_PER_TICK: u32 = SYSTEM_CLOCK_HZ / TICK_HZ;

pub const NANOS_PER_SEC: u32 = 1_000_000_000;

pub const NANOS_PER_TICK: u32 = NANOS_PER_SEC / TICK_HZ;

/// Per-task stack size in bytes. Must hold the deepest call chain plus
/// the hardware exception frame (32 bytes) and the software-saved
/// context (32 bytes for R4–R11).
pub const STACK_SIZE: usize = 1024;

/// Longest interval the scheduler may sleep between two decisions.
/// SysTick is 24 bits wide; at 96 MHz that is ~174 ticks, so stay below.
pub const MAX_SCHED_WAKEUP_TIME: Ticks = 160;

/// Ticks the core needs to come back from power-down before the
/// wakeup it was programmed for.
pub const SLEEP_WAKEUP_TIME: Ticks = 10;

/// Starting value of the minimum-wakeup search: "no suspended task pending".
pub const NO_PENDING_WAKEUP: Ticks = 60_000;

/// Upper bound of one scheduling pass, in high-resolution counter
/// ticks (core cycles). 100 µs at 96 MHz.
pub const CONTEXT_SWAP_TIME_BOUND: u32 = 9_600;

/// `event_suspend` value left by resource (mutex/semaphore) waits.
pub const EVENT_SUSPENDED_MARK: u8 = 0x80;

/// Number of faults retained by the kernel error log.
pub const ERROR_LOG_DEPTH: usize = 16;

/// Static priority of the idle task. Lowest possible.
pub const IDLE_PRIORITY: u8 = 0;

/// Task selection discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    /// Highest static priority among READY tasks, FIFO among equals.
    FixedPriority,
    /// Smallest `next_period` among READY non-idle tasks, lowest slot
    /// among equals.
    EarliestDeadline,
}

/// Build-time scheduling toggles, fixed once when the scheduler is
/// created. [`SchedulerConfig::DEFAULT`] reflects the cargo features
/// the crate was compiled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub discipline: Discipline,

    /// Sleep the core through the power-down dwell when idle is selected.
    pub power_down: bool,

    /// Global upper bound on the programmed wakeup.
    pub max_wakeup: Ticks,

    /// Wake latency subtracted from idle sleeps when `power_down` is set.
    pub sleep_wakeup_latency: Ticks,

    /// Warn when a pass exceeds `swap_time_bound`.
    pub verify_swap_bound: bool,

    /// Busy-wait until `swap_time_bound` so every swap costs the same.
    pub pad_swap_to_bound: bool,

    /// High-resolution ticks one pass may take.
    pub swap_time_bound: u32,
}

impl SchedulerConfig {
    pub const DEFAULT: Self = Self {
        discipline: if cfg!(feature = "edf") {
            Discipline::EarliestDeadline
        } else {
            Discipline::FixedPriority
        },
        power_down: !cfg!(feature = "no-power-down"),
        max_wakeup: MAX_SCHED_WAKEUP_TIME,
        sleep_wakeup_latency: SLEEP_WAKEUP_TIME,
        verify_swap_bound: !cfg!(feature = "no-bounded-context-swap"),
        pad_swap_to_bound: cfg!(feature = "pad-context-swap"),
        swap_time_bound: CONTEXT_SWAP_TIME_BOUND,
    };

    pub const fn with_discipline(mut self, discipline: Discipline) -> Self {
        self.discipline = discipline;
        self
    }

    pub const fn with_power_down(mut self, enabled: bool) -> Self {
        self.power_down = enabled;
        self
    }

    /// Override the wakeup bound and the power-down wake latency.
    pub const fn with_wakeup_limits(mut self, max_wakeup: Ticks, latency: Ticks) -> Self {
        self.max_wakeup = max_wakeup;
        self.sleep_wakeup_latency = latency;
        self
    }

    #[inline]
    pub const fn uses_ready_queue(&self) -> bool {
        matches!(self.discipline, Discipline::FixedPriority)
    }

    /// Cycles by which a pass that took `spent` cycles exceeded the swap
    /// bound. `None` within the bound or when verification is off.
    #[inline]
    pub const fn swap_overrun(&self, spent: u32) -> Option<u32> {
        if self.verify_swap_bound && spent > self.swap_time_bound {
            Some(spent - self.swap_time_bound)
        } else {
            None
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
