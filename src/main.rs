//! # rkos Demo Firmware (mbed LPC1768)
//!
//! Three periodic tasks with CPU reserves, one LED each. The LED of the
//! running task is lit on every switch, so the schedule is visible on
//! the board.
//!
//! | Task | Priority | Period | Reserve | Behavior |
//! |------|----------|--------|---------|----------|
//! | `sampler_task` | 3 | 100 | 10 | Short job, then waits for its next period |
//! | `filter_task` | 2 | 250 | 30 | Longer job, yields halfway |
//! | `hog_task` | 1 | 500 | 20 | Never gives up the CPU |
//!
//! `hog_task` exceeds its reserve every period: the scheduler suspends
//! it until its next period and records a reserve violation. LED 4
//! lights whenever the error log holds a fault.

#![no_std]
#![no_main]

use core::ptr;

use cortex_m_rt::entry;
use panic_halt as _;

use rkos::arch::TaskSwitchObserver;
use rkos::config::SchedulerConfig;
use rkos::kernel;
use rkos::task::{TaskConfig, TaskId, TaskStack};

// ---------------------------------------------------------------------------
// Status LEDs (P1.18, P1.20, P1.21, P1.23)
// ---------------------------------------------------------------------------

const FIO1DIR: *mut u32 = 0x2009_C020 as *mut u32;
const FIO1SET: *mut u32 = 0x2009_C038 as *mut u32;
const FIO1CLR: *mut u32 = 0x2009_C03C as *mut u32;

const LED_PINS: [u32; 4] = [1 << 18, 1 << 20, 1 << 21, 1 << 23];
const LED_MASK: u32 = (1 << 18) | (1 << 20) | (1 << 21) | (1 << 23);
const FAULT_LED: usize = 3;

struct Leds;

impl Leds {
    fn init() -> Self {
        // Safety: GPIO1 registers of the LPC1768, only touched here
        unsafe {
            let dir = ptr::read_volatile(FIO1DIR);
            ptr::write_volatile(FIO1DIR, dir | LED_MASK);
            ptr::write_volatile(FIO1CLR, LED_MASK);
        }
        Leds
    }

    fn show(&self, led: usize, fault: bool) {
        let mut on = LED_PINS.get(led).copied().unwrap_or(0);
        if fault {
            on |= LED_PINS[FAULT_LED];
        }
        unsafe {
            ptr::write_volatile(FIO1CLR, LED_MASK & !on);
            ptr::write_volatile(FIO1SET, on);
        }
    }
}

impl TaskSwitchObserver for Leds {
    fn on_task_switch(&mut self, _old: TaskId, new: TaskId) {
        // Idle (slot 0) turns the task LEDs off
        let led = new.index().wrapping_sub(1);
        self.show(led, false);
    }
}

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

fn busy(iterations: u32) -> u32 {
    let mut acc: u32 = 0;
    for i in 0..iterations {
        acc = acc.wrapping_add(i);
        cortex_m::asm::nop();
    }
    acc
}

/// Samples every 100 ticks and is done well inside its reserve.
extern "C" fn sampler_task() -> ! {
    loop {
        busy(20_000);
        kernel::wait_until_next_period();
    }
}

/// Two halves per period with a yield in between.
extern "C" fn filter_task() -> ! {
    loop {
        busy(200_000);
        kernel::yield_task();
        busy(200_000);
        kernel::wait_until_next_period();
    }
}

/// Runs until the budget enforcer takes the CPU away.
extern "C" fn hog_task() -> ! {
    let mut acc: u32 = 0;
    loop {
        acc = acc.wrapping_add(busy(1_000));
        if kernel::last_fault().is_some() {
            Leds.show(FAULT_LED, true);
        }
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();

    let idle_stack = cortex_m::singleton!(: TaskStack = TaskStack::new()).unwrap();
    kernel::init(SchedulerConfig::DEFAULT, idle_stack);

    let leds = cortex_m::singleton!(: Leds = Leds::init()).unwrap();
    kernel::set_observer(leds);

    let tasks: [(extern "C" fn() -> !, TaskConfig); 3] = [
        (
            sampler_task,
            TaskConfig { priority: 3, period: 100, cpu_reserve: 10, offset: 0 },
        ),
        (
            filter_task,
            TaskConfig { priority: 2, period: 250, cpu_reserve: 30, offset: 0 },
        ),
        (
            hog_task,
            TaskConfig { priority: 1, period: 500, cpu_reserve: 20, offset: 5 },
        ),
    ];

    let stacks = cortex_m::singleton!(: [TaskStack; 3] = [TaskStack::new(), TaskStack::new(), TaskStack::new()]).unwrap();
    for ((entry, config), stack) in tasks.into_iter().zip(stacks) {
        kernel::create_task(entry, config, stack).expect("task table full");
    }

    kernel::start(cp)
}
