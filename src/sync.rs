//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstractions. All shared kernel state
//! must be accessed within a critical section to prevent data races
//! between task code and the scheduler interrupts. On the single-core
//! target the implementation masks interrupts (`cortex-m`'s
//! `critical-section-single-core`); host tests use the `std` one.

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section.
///
/// Keep critical sections short: they add directly to interrupt latency.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    ::critical_section::with(f)
}

/// A value shared between task code and interrupt handlers, installed
/// once at startup and only reachable inside a critical section.
pub struct Shared<T> {
    inner: Mutex<RefCell<Option<T>>>,
}

impl<T> Shared<T> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Install `value`, returning whatever was there before.
    pub fn init(&self, value: T) -> Option<T> {
        critical_section(|cs| self.inner.borrow_ref_mut(cs).replace(value))
    }

    /// Run `f` on the value. `None` if nothing has been installed.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        critical_section(|cs| self.inner.borrow_ref_mut(cs).as_mut().map(f))
    }
}

impl<T> Default for Shared<T> {
    fn default() -> Self {
        Self::new()
    }
}
