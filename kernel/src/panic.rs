//! Kernel panic handler.
//!
//! Prints the panic message over raw serial (no locks, no allocation),
//! then disables interrupts and halts.

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    unsafe { core::arch::asm!("cli") }

    crate::drivers::serial::force_unlock();
    crate::serial_println!("");
    crate::serial_println!("=== KERNEL PANIC ===");
    crate::serial_println!("{}", info);

    loop {
        unsafe { core::arch::asm!("cli; hlt") }
    }
}
