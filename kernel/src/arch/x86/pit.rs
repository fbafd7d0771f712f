//! 8254 Programmable Interval Timer (PIT) driver.
//!
//! Channel 0 in square-wave mode provides the scheduler tick. All
//! tick/wall-clock conversions use the frequency passed to [`init`]
//! (100 Hz in this kernel: one tick every 10 ms).

use core::sync::atomic::{AtomicU32, Ordering};

use crate::arch::x86::port::outb;

const PIT_CHANNEL0: u16 = 0x40;
const PIT_CMD: u16 = 0x43;
/// Base oscillator frequency of the 8254 PIT in Hz.
const PIT_FREQUENCY: u32 = 1_193_182;

/// Tick counter incremented by the IRQ0 handler.
static TICK_COUNT: AtomicU32 = AtomicU32::new(0);
static TICK_HZ: AtomicU32 = AtomicU32::new(100);

/// Program channel 0 to fire `freq` interrupts per second.
pub fn init(freq: u32) {
    let freq = if freq == 0 { 100 } else { freq };
    TICK_HZ.store(freq, Ordering::Relaxed);

    let divisor = PIT_FREQUENCY / freq;
    unsafe {
        // Channel 0, lobyte/hibyte, mode 3 (square wave), binary
        outb(PIT_CMD, 0x36);
        outb(PIT_CHANNEL0, (divisor & 0xFF) as u8);
        outb(PIT_CHANNEL0, ((divisor >> 8) & 0xFF) as u8);
    }
    TICK_COUNT.store(0, Ordering::Relaxed);
}

/// Advance the tick counter. Called from the IRQ0 handler.
pub fn tick() {
    TICK_COUNT.fetch_add(1, Ordering::Relaxed);
}

/// Current tick count since boot.
#[inline]
pub fn get_ticks() -> u32 {
    TICK_COUNT.load(Ordering::Relaxed)
}

/// Uptime in whole seconds.
pub fn get_uptime() -> u32 {
    get_ticks() / TICK_HZ.load(Ordering::Relaxed)
}

/// Configured tick frequency in Hz.
pub fn hz() -> u32 {
    TICK_HZ.load(Ordering::Relaxed)
}

/// Sleep for the given number of milliseconds, halting between ticks.
pub fn delay_ms(ms: u32) {
    let hz = TICK_HZ.load(Ordering::Relaxed);
    let mut ticks = ms * hz / 1000;
    if ticks == 0 {
        ticks = 1;
    }
    let start = get_ticks();
    while get_ticks().wrapping_sub(start) < ticks {
        crate::arch::hal::halt();
    }
}
