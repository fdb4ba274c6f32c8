//! # Cortex-M3 Port Layer
//!
//! Hardware-specific code for the LPC1768 (ARM Cortex-M3, Thumb-2).
//! Implements the scheduler timer on SysTick + DWT, context switching
//! via PendSV, and the first-task launch.
//!
//! ## Timer Model
//!
//! - **OS timer**: scheduler ticks since the last pass, derived from the
//!   DWT cycle counter. SysTick is reloaded on every pass so that it
//!   fires exactly at the programmed wakeup.
//! - **High-resolution counter**: raw DWT cycles, used to measure and
//!   pad the scheduling pass.
//!
//! ## Context Switch Mechanism
//!
//! Tasks run in Thread mode on the PSP. On exception entry the hardware
//! stacks R0–R3, R12, LR, PC and xPSR; PendSV saves R4–R11 by hand, runs
//! the scheduling pass, loads the selected task's stack pointer and
//! returns from the exception into it. That return never comes back to
//! the scheduler.
//!
//! SysTick and PendSV both run at the lowest priority so neither ever
//! preempts an application interrupt or each other.

use core::arch::naked_asm;

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{DCB, DWT, SCB, SYST};

use crate::arch::HardwareTimer;
use crate::config::{Ticks, CYCLES_PER_TICK};

/// SysTick reload register width.
const SYST_MAX_RELOAD: u32 = 0x00FF_FFFF;

const LOWEST_PRIORITY: u8 = 0xFF;

// ---------------------------------------------------------------------------
// Scheduler timer
// ---------------------------------------------------------------------------

/// OS timer and high-resolution counter for the scheduler.
pub struct SysTickTimer {
    syst: SYST,
    os_base: u32,
    high_res_base: u32,
}

impl SysTickTimer {
    /// Take ownership of SysTick and start the DWT cycle counter.
    pub fn new(mut syst: SYST, dcb: &mut DCB, mut dwt: DWT) -> Self {
        dcb.enable_trace();
        dwt.enable_cycle_counter();

        syst.disable_counter();
        syst.set_clock_source(SystClkSource::Core);
        syst.set_reload(SYST_MAX_RELOAD);
        syst.clear_current();
        syst.enable_interrupt();
        syst.enable_counter();

        let now = DWT::cycle_count();
        Self {
            syst,
            os_base: now,
            high_res_base: now,
        }
    }
}

impl HardwareTimer for SysTickTimer {
    fn reset_high_res_counter(&mut self) {
        self.high_res_base = DWT::cycle_count();
    }

    fn read_high_res_counter(&self) -> u32 {
        DWT::cycle_count().wrapping_sub(self.high_res_base)
    }

    fn set_next_wakeup(&mut self, ticks: Ticks) {
        let delay = (ticks as u32).saturating_mul(CYCLES_PER_TICK);
        let spent = DWT::cycle_count().wrapping_sub(self.os_base);
        // A target already behind us fires as soon as possible
        let cycles = delay.saturating_sub(spent).clamp(1, SYST_MAX_RELOAD);

        self.syst.disable_counter();
        self.syst.set_reload(cycles.max(2) - 1);
        self.syst.clear_current();
        self.syst.enable_counter();
    }

    fn os_ticks(&self) -> Ticks {
        let ticks = DWT::cycle_count().wrapping_sub(self.os_base) / CYCLES_PER_TICK;
        ticks.min(Ticks::MAX as u32) as Ticks
    }

    fn reset_os_timer(&mut self) {
        self.os_base = DWT::cycle_count();
    }
}

// ---------------------------------------------------------------------------
// Interrupt configuration
// ---------------------------------------------------------------------------

/// Set PendSV and SysTick to the lowest interrupt priority.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    // Safety: priorities are set before the scheduler starts, so no
    // priority-based critical section can be active yet.
    unsafe {
        scb.set_priority(SystemHandler::PendSV, LOWEST_PRIORITY);
        scb.set_priority(SystemHandler::SysTick, LOWEST_PRIORITY);
    }
}

/// Request a context switch. Runs as soon as no other exception is active.
#[inline]
pub fn trigger_pendsv() {
    SCB::set_pendsv();
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Start the first task by switching Thread mode to the PSP and jumping
/// into the prepared frame.
///
/// # Safety
/// Must only be called once, with a stack pointer produced by
/// `TaskStack::prepare`.
pub unsafe fn start_first_task(psp: *const u32) -> ! {
    core::arch::asm!(
        // Skip the software-saved R4-R11 of the initial frame
        "adds r0, #32",
        "msr psp, r0",

        // Thread mode uses PSP (CONTROL.SPSEL = 1)
        "movs r0, #2",
        "msr control, r0",
        "isb",

        // Unwind the hardware frame by hand; this is not an exception return
        "pop {{r0-r3, r12}}",
        "pop {{r4}}",          // LR, the exit trap
        "pop {{r5}}",          // PC, the entry point
        "pop {{r6}}",          // xPSR, set by the core

        "cpsie i",
        "bx r5",

        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler.
///
/// ## Sequence
/// 1. Save R4–R11 onto the running task's stack (PSP)
/// 2. Run the scheduling pass with the saved PSP; it returns the PSP of
///    the selected task
/// 3. Restore R4–R11 from that stack and set PSP
/// 4. Exception return into the selected task
///
/// # Safety
/// Called directly by the NVIC.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",

        "bl {switch}",

        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",

        // EXC_RETURN: Thread mode, PSP
        "ldr r0, =0xFFFFFFFD",
        "bx r0",

        switch = sym switch_context,
    );
}

/// # Safety
/// Called from `PendSV` only.
unsafe extern "C" fn switch_context(psp: *mut u32) -> *mut u32 {
    crate::kernel::switch_context(psp)
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// The programmed wakeup elapsed: run the scheduler.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    trigger_pendsv();
}
