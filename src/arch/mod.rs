//! # Architecture Abstraction Layer
//!
//! The hardware boundary of the scheduler. The scheduling pass talks to
//! the timer and to task-switch observers only through the traits below;
//! the Cortex-M3 port implements them for the LPC1768 and provides the
//! context switch itself.

use crate::config::Ticks;
use crate::task::TaskId;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m3;

/// Timer hardware used by one scheduling pass.
///
/// The OS timer counts scheduler ticks since the last decision and fires
/// the scheduler interrupt when it reaches the programmed wakeup. The
/// high-resolution counter measures the pass itself.
pub trait HardwareTimer {
    fn reset_high_res_counter(&mut self);

    fn read_high_res_counter(&self) -> u32;

    /// Program the next scheduler interrupt `ticks` after the last OS
    /// timer reset.
    fn set_next_wakeup(&mut self, ticks: Ticks);

    /// Ticks elapsed since the last OS timer reset.
    fn os_ticks(&self) -> Ticks;

    /// Restart the OS tick count at zero.
    fn reset_os_timer(&mut self);

    /// Spin until `bound` high-resolution ticks have passed since `start`.
    fn wait_high_res_until(&self, start: u32, bound: u32) {
        while self.read_high_res_counter().wrapping_sub(start) < bound {
            core::hint::spin_loop();
        }
    }
}

/// Notified when the running task changes. Side effects only.
pub trait TaskSwitchObserver {
    fn on_task_switch(&mut self, old: TaskId, new: TaskId);
}

impl TaskSwitchObserver for () {
    fn on_task_switch(&mut self, _old: TaskId, _new: TaskId) {}
}
