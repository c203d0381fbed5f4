//! SysTick based time base.
//!
//! The binary configures SysTick to fire every millisecond (see
//! `init::init_systick`) and calls [`tick`] from the exception handler, so
//! one tick equals one millisecond.

use core::sync::atomic::{AtomicUsize, Ordering};

static TICKS: AtomicUsize = AtomicUsize::new(0);

/// Advance the counter by one tick. Called from the SysTick exception.
pub fn tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Ticks elapsed since [`reset_ticks`] (or power-up).
pub fn ticks() -> usize {
    TICKS.load(Ordering::Relaxed)
}

pub fn reset_ticks() {
    TICKS.store(0, Ordering::Relaxed);
}

/// Busy-wait for `ms` milliseconds.
pub fn wait(ms: usize) {
    let start = ticks();
    while ticks() < start + ms {}
}
