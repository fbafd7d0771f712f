//! Hardware Abstraction Layer — platform-agnostic API.
//!
//! Free functions with `cfg`-gated forwarding to the active architecture.
//! On hosted builds (tests, the stdin REPL) the timer is a deterministic
//! software clock that advances on every read, so poll-with-timeout loops
//! terminate without real interrupts.

/// Enable interrupts on the current CPU.
#[cfg(target_os = "none")]
#[inline]
pub fn enable_interrupts() {
    unsafe { core::arch::asm!("sti", options(nomem, nostack)) }
}

#[cfg(not(target_os = "none"))]
#[inline]
pub fn enable_interrupts() {}

/// Disable interrupts on the current CPU.
#[cfg(target_os = "none")]
#[inline]
pub fn disable_interrupts() {
    unsafe { core::arch::asm!("cli", options(nomem, nostack)) }
}

#[cfg(not(target_os = "none"))]
#[inline]
pub fn disable_interrupts() {}

/// Check if interrupts are enabled on the current CPU.
#[cfg(target_os = "none")]
#[inline]
pub fn interrupts_enabled() -> bool {
    let eflags: u32;
    unsafe {
        core::arch::asm!(
            "pushfd; pop {}",
            out(reg) eflags,
            options(nomem, preserves_flags)
        )
    }
    eflags & 0x200 != 0
}

#[cfg(not(target_os = "none"))]
#[inline]
pub fn interrupts_enabled() -> bool {
    false
}

/// Halt the CPU until the next interrupt.
#[cfg(target_os = "none")]
#[inline]
pub fn halt() {
    unsafe { core::arch::asm!("hlt", options(nomem, nostack)) }
}

#[cfg(not(target_os = "none"))]
#[inline]
pub fn halt() {
    core::hint::spin_loop();
}

/// Current tick count since boot (100 Hz).
#[cfg(target_os = "none")]
#[inline]
pub fn get_ticks() -> u32 {
    crate::arch::x86::pit::get_ticks()
}

/// Hosted software clock: one tick per read, so tick-based timeouts elapse
/// deterministically without a hardware timer.
#[cfg(not(target_os = "none"))]
pub fn get_ticks() -> u32 {
    use core::sync::atomic::{AtomicU32, Ordering};
    static FAKE_TICKS: AtomicU32 = AtomicU32::new(0);
    FAKE_TICKS.fetch_add(1, Ordering::Relaxed)
}

/// Busy-wait for the given number of milliseconds.
#[cfg(target_os = "none")]
pub fn delay_ms(ms: u32) {
    crate::arch::x86::pit::delay_ms(ms);
}

#[cfg(not(target_os = "none"))]
pub fn delay_ms(_ms: u32) {}
