//! # Kernel
//!
//! Top-level kernel state and public API. The kernel owns the scheduler,
//! the error log, the scheduler timer and the optional task-switch
//! observer; every access goes through a critical section.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()        ← Scheduler with the idle task
//!         ├─► kernel::create_task() ← Install tasks (×N)
//!         └─► kernel::start()       ← No return
//!               ├─► Set interrupt priorities, start SysTick/DWT
//!               ├─► First scheduling pass
//!               └─► arch::start_first_task()
//! ```
//!
//! After `start`, the scheduler runs from PendSV, pended either by the
//! SysTick wakeup or by a task giving up the CPU.

use crate::arch::cortex_m3::{self, SysTickTimer};
use crate::arch::{HardwareTimer, TaskSwitchObserver};
use crate::config::SchedulerConfig;
use crate::error::{KernelErrorLog, KernelFault, TaskError};
use crate::scheduler::Scheduler;
use crate::sync::Shared;
use crate::task::{TaskConfig, TaskControlBlock, TaskEntry, TaskId, TaskStack};
use crate::time::SystemTime;

// ---------------------------------------------------------------------------
// Global kernel instance
// ---------------------------------------------------------------------------

struct Kernel {
    scheduler: Scheduler,
    errors: KernelErrorLog,
    /// Installed by `start`.
    timer: Option<SysTickTimer>,
    observer: Option<&'static mut (dyn TaskSwitchObserver + Send)>,
}

impl Kernel {
    fn run_scheduler(&mut self) -> Option<*mut u32> {
        let timer = self.timer.as_mut()?;
        timer.reset_os_timer();
        let dispatch = match self.observer.as_deref_mut() {
            Some(observer) => self.scheduler.schedule(timer, &mut self.errors, observer),
            None => self.scheduler.schedule(timer, &mut self.errors, &mut ()),
        };
        Some(dispatch.stack_pointer)
    }
}

static KERNEL: Shared<Kernel> = Shared::new();

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the kernel with the idle task in slot 0.
///
/// Must be called once, from `main`, before any other kernel function.
pub fn init(config: SchedulerConfig, idle_stack: &'static mut TaskStack) {
    let sp = idle_stack.prepare(idle_task, task_exit);
    let scheduler = Scheduler::new(config, TaskControlBlock::idle(idle_task, sp));

    KERNEL.init(Kernel {
        scheduler,
        errors: KernelErrorLog::new(),
        timer: None,
        observer: None,
    });
}

/// Register an observer notified on every task switch.
pub fn set_observer(observer: &'static mut (dyn TaskSwitchObserver + Send)) {
    KERNEL.with(|k| k.observer = Some(observer));
}

/// Install a task in the lowest free slot.
///
/// # Returns
/// - `Ok(task_id)`: the slot the task was installed in
/// - `Err(TaskError::TableFull)`: every slot is in use
pub fn create_task(
    entry: TaskEntry,
    config: TaskConfig,
    stack: &'static mut TaskStack,
) -> Result<TaskId, TaskError> {
    KERNEL
        .with(|k| {
            let id = k.scheduler.free_slot()?;
            let sp = stack.prepare(entry, task_exit);
            k.scheduler.install(TaskControlBlock::new(id, config, entry, sp))
        })
        .unwrap_or(Err(TaskError::TableFull))
}

/// Start scheduling. **Does not return.**
///
/// Configures the timer and interrupt priorities, runs the first pass
/// and launches the selected task.
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    cortex_m3::set_interrupt_priorities(&mut core_peripherals.SCB);
    let timer = SysTickTimer::new(
        core_peripherals.SYST,
        &mut core_peripherals.DCB,
        core_peripherals.DWT,
    );

    let first_sp = KERNEL
        .with(|k| {
            k.timer = Some(timer);
            k.run_scheduler()
        })
        .flatten();

    match first_sp {
        // Safety: the stack pointer comes from TaskStack::prepare
        Some(sp) => unsafe { cortex_m3::start_first_task(sp) },
        // `init` was never called
        None => loop {
            cortex_m::asm::wfi();
        },
    }
}

/// Give up the CPU; the calling task stays Ready.
pub fn yield_task() {
    KERNEL.with(|k| {
        if let Some(timer) = k.timer.as_ref() {
            k.scheduler.yield_now(timer.os_ticks());
        }
    });
    cortex_m3::trigger_pendsv();
}

/// End the current job; the task sleeps until its next period.
pub fn wait_until_next_period() {
    KERNEL.with(|k| {
        if let Some(timer) = k.timer.as_ref() {
            k.scheduler.wait_until_next_period(timer.os_ticks());
        }
    });
    cortex_m3::trigger_pendsv();
}

/// Time since the scheduler started, as of the last pass.
pub fn system_time() -> SystemTime {
    KERNEL.with(|k| k.scheduler.system_time()).unwrap_or_default()
}

/// Most recent scheduling fault, if any.
pub fn last_fault() -> Option<KernelFault> {
    KERNEL.with(|k| k.errors.last().copied()).flatten()
}

// ---------------------------------------------------------------------------
// Port hooks
// ---------------------------------------------------------------------------

/// Save the preempted task's stack pointer and run a scheduling pass.
/// Returns the stack pointer to resume; `psp` itself if the kernel is
/// not running yet.
pub(crate) fn switch_context(psp: *mut u32) -> *mut u32 {
    KERNEL
        .with(|k| {
            k.scheduler.save_context(psp);
            k.run_scheduler()
        })
        .flatten()
        .unwrap_or(psp)
}

// ---------------------------------------------------------------------------
// Built-in tasks
// ---------------------------------------------------------------------------

/// Idle task: power the core down until the next interrupt.
extern "C" fn idle_task() -> ! {
    loop {
        KERNEL.with(|k| k.scheduler.enter_idle());
        cortex_m::asm::wfi();
    }
}

/// Return address for task frames. Entry points never return; if one
/// does, park it.
extern "C" fn task_exit() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}
