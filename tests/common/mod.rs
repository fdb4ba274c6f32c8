//! Host harness shared by the scheduler integration tests: a simulated
//! timer, a recording observer and task/scheduler builders.

#![allow(dead_code)]

use std::cell::Cell;

use rkos::arch::{HardwareTimer, TaskSwitchObserver};
use rkos::config::{Discipline, SchedulerConfig, Ticks};
use rkos::error::KernelErrorLog;
use rkos::scheduler::{Dispatch, Scheduler};
use rkos::task::{TaskConfig, TaskControlBlock, TaskId};

pub extern "C" fn spin() -> ! {
    loop {
        std::hint::spin_loop();
    }
}

/// Timer whose OS tick count only moves when a test sets `now`.
#[derive(Debug, Default)]
pub struct SimTimer {
    pub now: Ticks,
    /// Every value passed to `set_next_wakeup`, in order.
    pub programmed: Vec<Ticks>,
    cycles: Cell<u32>,
}

impl SimTimer {
    pub fn last_programmed(&self) -> Option<Ticks> {
        self.programmed.last().copied()
    }
}

impl HardwareTimer for SimTimer {
    fn reset_high_res_counter(&mut self) {
        self.cycles.set(0);
    }

    fn read_high_res_counter(&self) -> u32 {
        let value = self.cycles.get();
        self.cycles.set(value.wrapping_add(1));
        value
    }

    fn set_next_wakeup(&mut self, ticks: Ticks) {
        self.programmed.push(ticks);
    }

    fn os_ticks(&self) -> Ticks {
        self.now
    }

    fn reset_os_timer(&mut self) {
        self.now = 0;
    }
}

#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub switches: Vec<(TaskId, TaskId)>,
}

impl TaskSwitchObserver for RecordingObserver {
    fn on_task_switch(&mut self, old: TaskId, new: TaskId) {
        self.switches.push((old, new));
    }
}

/// Scheduler, timer, error log and observer wired together.
pub struct Harness {
    pub sched: Scheduler,
    pub timer: SimTimer,
    pub log: KernelErrorLog,
    pub observer: RecordingObserver,
}

impl Harness {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            sched: Scheduler::new(config, TaskControlBlock::idle(spin, std::ptr::null_mut())),
            timer: SimTimer::default(),
            log: KernelErrorLog::new(),
            observer: RecordingObserver::default(),
        }
    }

    pub fn install(&mut self, slot: usize, priority: u8, period: Ticks, cpu_reserve: Ticks) -> TaskId {
        self.install_with(slot, TaskConfig { priority, period, cpu_reserve, offset: 0 })
    }

    pub fn install_with(&mut self, slot: usize, config: TaskConfig) -> TaskId {
        self.sched.install(tcb(slot, config)).expect("slot free")
    }

    /// One pass that accounts `elapsed` ticks, entered through a yield.
    pub fn pass(&mut self, elapsed: Ticks) -> Dispatch {
        self.sched.yield_now(elapsed);
        self.timer.reset_os_timer();
        self.sched.schedule(&mut self.timer, &mut self.log, &mut self.observer)
    }

    /// The running task finishes its job after `elapsed` ticks.
    pub fn finish_job(&mut self, elapsed: Ticks) -> Dispatch {
        self.sched.wait_until_next_period(elapsed);
        self.timer.reset_os_timer();
        self.sched.schedule(&mut self.timer, &mut self.log, &mut self.observer)
    }

    pub fn task(&self, id: TaskId) -> &TaskControlBlock {
        self.sched.task(id).expect("task installed")
    }

    pub fn task_mut(&mut self, id: TaskId) -> &mut TaskControlBlock {
        self.sched.task_mut(id).expect("task installed")
    }
}

pub fn id(slot: usize) -> TaskId {
    TaskId::new(slot).expect("slot in range")
}

pub fn tcb(slot: usize, config: TaskConfig) -> TaskControlBlock {
    TaskControlBlock::new(id(slot), config, spin, std::ptr::null_mut())
}

/// Wide wakeup bound and a 50-tick wake latency, no swap padding.
pub fn config(discipline: Discipline) -> SchedulerConfig {
    let mut config = SchedulerConfig::DEFAULT
        .with_discipline(discipline)
        .with_power_down(true)
        .with_wakeup_limits(1000, 50);
    config.verify_swap_bound = false;
    config.pad_swap_to_bound = false;
    config
}
