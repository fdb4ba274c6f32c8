//! # Scheduler
//!
//! The scheduling decision. One call to [`Scheduler::schedule`] runs a
//! complete, non-preemptible pass and produces the [`Dispatch`] the port
//! switches to.
//!
//! ## Scheduling Pass
//!
//! Every timer interrupt or voluntary yield runs, in order:
//! 1. **Clock**: fold the elapsed ticks into the system time
//! 2. **Previous task**: resolve a pending suspension of the task that ran
//! 3. **Budget**: charge the elapsed ticks against its CPU reserve
//! 4. **Admission sweep**: decay countdowns of every task, promote due
//!    tasks, find the earliest pending wakeup and the nearest deadline
//! 5. **Select**: fixed-priority queue head or earliest deadline
//! 6. **Sleep & dispatch**: bound the next wakeup, commit the selection,
//!    reprogram the timer
//!
//! ## Faults
//!
//! Reserve violations and deadline misses are logged and recorded but
//! never abort a pass. The idle task is always selectable, so every pass
//! ends with a valid task.

use core::iter;

use log::{debug, trace, warn};

use crate::arch::{HardwareTimer, TaskSwitchObserver};
use crate::config::{Discipline, SchedulerConfig, Ticks, MAX_TASKS, NO_PENDING_WAKEUP};
use crate::error::{ErrorLog, KernelFault, TaskError};
use crate::ready_queue::{PriorityReadyQueue, ReadyQueue};
use crate::task::{Charge, PeriodAdvance, TaskControlBlock, TaskEntry, TaskId, TaskState};
use crate::time::SystemTime;

// ---------------------------------------------------------------------------
// Task table
// ---------------------------------------------------------------------------

/// Fixed table of task slots. Slot 0 holds the idle task and can never
/// be empty; every other slot is either a task or disabled (`None`).
struct TaskTable {
    idle: TaskControlBlock,
    slots: [Option<TaskControlBlock>; MAX_TASKS - 1],
}

impl TaskTable {
    const EMPTY: Option<TaskControlBlock> = None;

    fn new(idle: TaskControlBlock) -> Self {
        Self {
            idle,
            slots: [Self::EMPTY; MAX_TASKS - 1],
        }
    }

    fn get(&self, id: TaskId) -> Option<&TaskControlBlock> {
        match id.index().checked_sub(1) {
            None => Some(&self.idle),
            Some(i) => self.slots[i].as_ref(),
        }
    }

    fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskControlBlock> {
        match id.index().checked_sub(1) {
            None => Some(&mut self.idle),
            Some(i) => self.slots[i].as_mut(),
        }
    }

    fn get_or_idle(&self, id: TaskId) -> &TaskControlBlock {
        self.get(id).unwrap_or(&self.idle)
    }

    fn get_mut_or_idle(&mut self, id: TaskId) -> &mut TaskControlBlock {
        match id.index().checked_sub(1).and_then(|i| self.slots[i].as_mut()) {
            Some(tcb) => tcb,
            None => &mut self.idle,
        }
    }

    /// Enabled tasks in slot order, idle first.
    fn iter(&self) -> impl Iterator<Item = &TaskControlBlock> {
        iter::once(&self.idle).chain(self.slots.iter().flatten())
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut TaskControlBlock> {
        iter::once(&mut self.idle).chain(self.slots.iter_mut().flatten())
    }
}

// ---------------------------------------------------------------------------
// Pass results
// ---------------------------------------------------------------------------

/// Whether the core is running a task or dwelling in the idle task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuState {
    /// The idle task announced it is about to power the core down.
    Idle,
    /// A non-idle task was dispatched since the last idle entry.
    Active,
}

/// Outcome of one scheduling pass, consumed by the context switch.
#[derive(Debug, Clone, Copy)]
pub struct Dispatch {
    /// Task to run.
    pub task: TaskId,
    /// Task that ran before this pass.
    pub previous: TaskId,
    /// Entry point of `task`. A freshly prepared stack frame returns
    /// here on first dispatch; afterwards the saved frame takes over.
    pub entry: TaskEntry,
    /// Saved stack pointer of `task`; the port restores it.
    pub stack_pointer: *mut u32,
    /// Ticks until the next scheduler interrupt, as programmed.
    pub sleep_ticks: Ticks,
}

impl Dispatch {
    #[inline]
    pub fn is_switch(&self) -> bool {
        self.task != self.previous
    }
}

/// What the admission sweep found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sweep {
    /// Smallest positive `next_wakeup` among suspended tasks left
    /// suspended, or `NO_PENDING_WAKEUP`.
    min_wakeup: Ticks,
    /// READY non-idle task with the smallest `next_period`.
    earliest_deadline: Option<TaskId>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Scheduler state: the task table, the ready queue, the running task,
/// and the system clock. Owned by the kernel and only touched inside a
/// critical section.
pub struct Scheduler<Q: ReadyQueue = PriorityReadyQueue> {
    table: TaskTable,
    ready_queue: Q,

    /// Task the last pass dispatched.
    current: TaskId,
    /// Static priority of `current`, committed with it.
    current_priority: u8,

    clock: SystemTime,

    /// Ticks the next pass treats as elapsed. Set to the programmed
    /// sleep by every pass, overwritten by voluntary yields.
    baseline_ticks: Ticks,

    cpu_state: CpuState,
    config: SchedulerConfig,
}

impl<Q: ReadyQueue + Default> Scheduler<Q> {
    /// Create a scheduler holding only the idle task.
    pub fn new(config: SchedulerConfig, idle: TaskControlBlock) -> Self {
        Self::with_queue(config, idle, Q::default())
    }
}

impl<Q: ReadyQueue> Scheduler<Q> {
    /// Create a scheduler around a caller-supplied ready queue. The idle
    /// TCB is forced into slot 0.
    pub fn with_queue(config: SchedulerConfig, mut idle: TaskControlBlock, ready_queue: Q) -> Self {
        idle.id = TaskId::IDLE;
        let current_priority = idle.priority;
        Self {
            table: TaskTable::new(idle),
            ready_queue,
            current: TaskId::IDLE,
            current_priority,
            clock: SystemTime::ZERO,
            baseline_ticks: 0,
            cpu_state: CpuState::Idle,
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Table management
    // -----------------------------------------------------------------------

    /// Place `tcb` into the slot named by its id.
    pub fn install(&mut self, tcb: TaskControlBlock) -> Result<TaskId, TaskError> {
        let id = tcb.id;
        if id.is_idle() {
            return Err(TaskError::IdleSlotReserved);
        }
        let slot = &mut self.table.slots[id.index() - 1];
        if slot.is_some() {
            return Err(TaskError::SlotOccupied(id));
        }

        if tcb.is_ready() && self.config.uses_ready_queue() {
            self.ready_queue.add(id, tcb.priority);
        }
        *slot = Some(tcb);
        debug!("installed task {} (prio {}, period {})", id, tcb.priority, tcb.period);
        Ok(id)
    }

    /// Lowest disabled slot.
    pub fn free_slot(&self) -> Result<TaskId, TaskError> {
        self.table
            .slots
            .iter()
            .position(Option::is_none)
            .and_then(|i| TaskId::new(i + 1))
            .ok_or(TaskError::TableFull)
    }

    /// TCB in slot `id`; `None` for a disabled slot.
    pub fn task(&self, id: TaskId) -> Option<&TaskControlBlock> {
        self.table.get(id)
    }

    /// Mutable access for kernel services that raise suspend flags.
    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut TaskControlBlock> {
        self.table.get_mut(id)
    }

    /// Enabled tasks in slot order, idle first.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskControlBlock> {
        self.table.iter()
    }

    // -----------------------------------------------------------------------
    // State queries
    // -----------------------------------------------------------------------

    /// Task the last pass dispatched.
    pub fn current(&self) -> TaskId {
        self.current
    }

    /// Priority of the running task.
    pub fn current_priority(&self) -> u8 {
        self.current_priority
    }

    /// TCB of the running task; idle if its slot was emptied.
    pub fn current_tcb(&self) -> &TaskControlBlock {
        self.table.get_or_idle(self.current)
    }

    /// System clock as of the last pass.
    pub fn system_time(&self) -> SystemTime {
        self.clock
    }

    /// Whether the core is running a task or dwelling in idle.
    pub fn cpu_state(&self) -> CpuState {
        self.cpu_state
    }

    /// Ticks the next pass will account as elapsed.
    pub fn baseline(&self) -> Ticks {
        self.baseline_ticks
    }

    /// Scheduling toggles fixed at construction.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Ready queue; only maintained in fixed-priority mode.
    pub fn ready_queue(&self) -> &Q {
        &self.ready_queue
    }

    // -----------------------------------------------------------------------
    // Entry paths
    // -----------------------------------------------------------------------

    /// Voluntary yield: the current task stays Ready. `elapsed` is the
    /// OS timer reading, i.e. the ticks actually used since the last pass.
    pub fn yield_now(&mut self, elapsed: Ticks) {
        self.baseline_ticks = elapsed;
    }

    /// The current task is done for this period. It is suspended by the
    /// next pass and woken when its wakeup countdown runs out.
    pub fn wait_until_next_period(&mut self, elapsed: Ticks) {
        let current = self.current;
        if !current.is_idle() {
            self.table.get_mut_or_idle(current).request_suspend();
        }
        self.baseline_ticks = elapsed;
    }

    /// Store the stack pointer the port saved for the running task.
    pub fn save_context(&mut self, stack_pointer: *mut u32) {
        self.table.get_mut_or_idle(self.current).stack_pointer = stack_pointer;
    }

    /// Called by the idle task right before it powers the core down.
    pub fn enter_idle(&mut self) {
        self.cpu_state = CpuState::Idle;
    }

    // -----------------------------------------------------------------------
    // The scheduling pass
    // -----------------------------------------------------------------------

    /// Run one scheduling pass and return the task to dispatch.
    ///
    /// Must run to completion without being preempted. Leaves the wakeup
    /// timer programmed to a point in the future.
    pub fn schedule<T, L, O>(&mut self, timer: &mut T, log: &mut L, observer: &mut O) -> Dispatch
    where
        T: HardwareTimer,
        L: ErrorLog,
        O: TaskSwitchObserver + ?Sized,
    {
        let guard = self.config.verify_swap_bound || self.config.pad_swap_to_bound;
        let start = if guard {
            timer.reset_high_res_counter();
            timer.read_high_res_counter()
        } else {
            0
        };

        // Nothing below may leave the timer unprogrammed
        timer.set_next_wakeup(self.config.max_wakeup);

        let elapsed = self.baseline_ticks;
        let previous = self.current;

        self.clock.advance(elapsed);
        self.resolve_previous();
        self.enforce_budget(elapsed, log);
        let sweep = self.admission_sweep(elapsed, log);
        let selected = self.select(&sweep);
        let mut next_wake = self.plan_sleep(selected, sweep.min_wakeup);

        trace!(
            "pass: elapsed {} min wake {} selected {} sleep {}",
            elapsed,
            sweep.min_wakeup,
            selected,
            next_wake
        );

        if selected != previous {
            debug!("switch task {} -> {}", previous, selected);
            if let Some(tcb) = self.table.get_mut(selected) {
                tcb.stats.swapped_in += 1;
            }
            observer.on_task_switch(previous, selected);
        }
        let tcb = self.table.get_or_idle(selected);
        self.current = selected;
        self.current_priority = tcb.priority;
        let (entry, stack_pointer) = (tcb.entry, tcb.stack_pointer);

        self.baseline_ticks = next_wake;
        let now = timer.os_ticks();
        if now.saturating_add(1) >= next_wake {
            // On the edge of the programmed tick: push it out
            next_wake = now.saturating_add(2);
            self.baseline_ticks = next_wake;
        }

        if !selected.is_idle() {
            self.cpu_state = CpuState::Active;
        }
        timer.set_next_wakeup(next_wake);

        if guard {
            let spent = timer.read_high_res_counter().wrapping_sub(start);
            if let Some(over) = self.config.swap_overrun(spent) {
                warn!(
                    "context swap took {} cycles, {} over bound {}",
                    spent, over, self.config.swap_time_bound
                );
            }
            if self.config.pad_swap_to_bound {
                timer.wait_high_res_until(start, self.config.swap_time_bound);
            }
        }

        Dispatch {
            task: selected,
            previous,
            entry,
            stack_pointer,
            sleep_ticks: next_wake,
        }
    }

    /// Move the previous task out of Ready if it asked to be suspended.
    fn resolve_previous(&mut self) {
        let tcb = self.table.get_mut_or_idle(self.current);
        if let Some(state) = tcb.resolve_suspension() {
            trace!("task {} now {:?}", tcb.id, state);
            if self.config.uses_ready_queue() {
                self.ready_queue.remove(tcb.id);
            }
        }
    }

    /// Charge the previous task's reserve; suspend it once exhausted.
    fn enforce_budget<L: ErrorLog>(&mut self, elapsed: Ticks, log: &mut L) {
        let tcb = self.table.get_mut_or_idle(self.current);
        let charge = tcb.charge(elapsed);

        if let Charge::Overrun { overrun } = charge {
            let fault = KernelFault::ReserveViolation {
                task: tcb.id,
                elapsed,
                overrun,
            };
            warn!("{}", fault);
            log.record(fault);
        }

        if charge != Charge::Exempt && tcb.state == TaskState::Suspended {
            trace!("task {} reserve exhausted", tcb.id);
            if self.config.uses_ready_queue() {
                self.ready_queue.remove(tcb.id);
            }
        }
    }

    /// Walk every enabled slot once: decay countdowns, promote due tasks,
    /// and collect the minimum pending wakeup and the nearest deadline.
    fn admission_sweep<L: ErrorLog>(&mut self, elapsed: Ticks, log: &mut L) -> Sweep {
        let uses_queue = self.config.uses_ready_queue();
        let mut min_wakeup = NO_PENDING_WAKEUP;
        let mut earliest: Option<(Ticks, TaskId)> = None;

        for tcb in self.table.iter_mut() {
            tcb.suspend_flag = false;

            if !tcb.is_idle() && tcb.state != TaskState::Finished {
                if let PeriodAdvance::Missed { overrun } = tcb.advance_countdowns(elapsed) {
                    let fault = KernelFault::DeadlineMiss { task: tcb.id, overrun };
                    warn!("{}", fault);
                    log.record(fault);
                }
            }

            if tcb.is_due() {
                tcb.promote();
                trace!("task {} ready", tcb.id);
                if uses_queue {
                    self.ready_queue.add(tcb.id, tcb.priority);
                }
            } else if tcb.state == TaskState::Suspended && tcb.next_wakeup < min_wakeup {
                min_wakeup = tcb.next_wakeup;
            }

            if !tcb.is_idle()
                && tcb.is_ready()
                && earliest.map_or(true, |(deadline, _)| tcb.next_period < deadline)
            {
                earliest = Some((tcb.next_period, tcb.id));
            }
        }

        Sweep {
            min_wakeup,
            earliest_deadline: earliest.map(|(_, id)| id),
        }
    }

    /// Pick the next task; idle when nothing else is runnable.
    fn select(&self, sweep: &Sweep) -> TaskId {
        let candidate = match self.config.discipline {
            Discipline::FixedPriority => self.ready_queue.head(),
            Discipline::EarliestDeadline => sweep.earliest_deadline,
        };
        candidate
            .filter(|&id| self.table.get(id).is_some())
            .unwrap_or(TaskId::IDLE)
    }

    /// Ticks until the next decision is needed for `selected`.
    fn plan_sleep(&self, selected: TaskId, min_wakeup: Ticks) -> Ticks {
        let max = self.config.max_wakeup;
        let mut next_wake = min_wakeup;

        if !selected.is_idle() {
            let tcb = self.table.get_or_idle(selected);
            if tcb.cpu_reserve != 0 && tcb.cpu_remaining < max {
                // Come back no later than the budget runs out
                next_wake = next_wake.min(tcb.cpu_remaining);
            } else {
                next_wake = next_wake.min(max);
            }
        } else if self.config.power_down {
            next_wake = power_down_dwell(next_wake, self.config.sleep_wakeup_latency, max);
        }

        next_wake.min(max)
    }
}

/// Shorten an idle sleep by the power-down wake latency so the core is
/// up in time. Results shorter than the latency become `latency - 1`.
fn power_down_dwell(next_wake: Ticks, latency: Ticks, max: Ticks) -> Ticks {
    if next_wake <= latency {
        return next_wake;
    }
    let dwell = next_wake - latency;
    if dwell < max {
        if dwell < latency {
            latency - 1
        } else {
            dwell
        }
    } else if next_wake > latency.saturating_add(max) {
        max
    } else {
        max.saturating_sub(latency)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
