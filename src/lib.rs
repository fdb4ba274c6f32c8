//! # rkos — Resource Kernel OS scheduling core
//!
//! The tick-driven scheduler of a small real-time resource kernel for
//! ARM Cortex-M3 sensor nodes (reference board: LPC1768).
//!
//! ## Overview
//!
//! Every task owns a period and an optional CPU reserve (ticks of CPU it
//! may use per period). On each timer interrupt or voluntary yield the
//! scheduler runs one atomic pass that:
//!
//! - **Advances the system clock** by the ticks that elapsed
//! - **Charges the running task** against its reserve and suspends it
//!   when the reserve is spent
//! - **Wakes suspended tasks** whose countdown expired and refills their
//!   budget for the new period
//! - **Selects the next task** by fixed priority or earliest deadline
//! - **Computes how long the core may sleep** before the next decision,
//!   trimmed by the power-down wake latency when idle
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │  init() · create_task() · start() · wait_until_next_period() │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │   Ready Queue      │  Sync Primitives  │
//! │  scheduler.rs│   ready_queue.rs   │  sync.rs          │
//! │  ─ schedule()│   ─ add/remove     │  ─ critical_section│
//! │  ─ install() │   ─ head()         │  ─ Shared<T>      │
//! ├──────────────┴─────┬──────────────┴───────────────────┤
//! │  Task Model        │  Errors & Clock                   │
//! │  task.rs           │  error.rs · time.rs               │
//! ├────────────────────┴───────────────────────────────────┤
//! │            Arch Port (arch/cortex_m3.rs)                │
//! │    SysTick/DWT timer · PendSV context switch            │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically sized
//! - **Fixed task table**: `MAX_TASKS` slots, slot 0 is the idle task
//! - **Per-task stacks**: `'static` [`task::TaskStack`]s supplied by the
//!   application
//! - **Critical sections** around every access to kernel state
//!
//! The scheduler core, task model, queue, clock and error log are
//! portable and tested on the host; `arch::cortex_m3` and `kernel` are
//! only built for the bare-metal ARM target.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod task;
pub mod time;
pub mod ready_queue;
pub mod error;
pub mod arch;
pub mod scheduler;
pub mod sync;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod kernel;
