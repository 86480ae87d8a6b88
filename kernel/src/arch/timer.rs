//! PIT-driven timer tick counter.
//!
//! The PIT is programmed for 100 Hz (spec §4.9); every tick increments a
//! monotonic counter that the scheduler and log service read timestamps
//! from. There is no wall-clock/RTC in this core -- `get_timestamp_ms` is
//! ticks-since-boot, not calendar time.

use core::sync::atomic::{AtomicU64, Ordering};

const TICK_HZ: u64 = 100;

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Called from the timer interrupt handler (IRQ0).
pub fn tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

pub fn get_ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

pub fn get_timestamp_ms() -> u64 {
    get_ticks() * (1000 / TICK_HZ)
}

pub fn get_timestamp_secs() -> u64 {
    get_ticks() / TICK_HZ
}
