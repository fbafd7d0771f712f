//! 16550 UART (COM1) driver for kernel diagnostics.
//!
//! Output only. The `serial_print!`/`serial_println!` macros are the raw
//! diagnostic channel; the `log` facade sits on top of them. On hosted
//! builds the macros forward to stderr.

#[cfg(target_os = "none")]
mod uart {
    use core::sync::atomic::{AtomicBool, Ordering};

    use crate::arch::x86::port::{inb, outb};

    const COM1: u16 = 0x3F8;

    static LOCK: AtomicBool = AtomicBool::new(false);

    /// Program COM1 for 115200 8N1 with FIFOs enabled.
    pub fn init() {
        unsafe {
            outb(COM1 + 1, 0x00); // disable interrupts
            outb(COM1 + 3, 0x80); // DLAB on
            outb(COM1 + 0, 0x01); // divisor 1 = 115200 baud
            outb(COM1 + 1, 0x00);
            outb(COM1 + 3, 0x03); // 8N1, DLAB off
            outb(COM1 + 2, 0xC7); // FIFO enabled, cleared, 14-byte threshold
            outb(COM1 + 4, 0x0B); // DTR + RTS + OUT2
        }
    }

    fn write_byte(byte: u8) {
        unsafe {
            while inb(COM1 + 5) & 0x20 == 0 {
                core::hint::spin_loop();
            }
            outb(COM1, byte);
        }
    }

    pub struct SerialWriter;

    impl core::fmt::Write for SerialWriter {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            for byte in s.bytes() {
                if byte == b'\n' {
                    write_byte(b'\r');
                }
                write_byte(byte);
            }
            Ok(())
        }
    }

    pub fn with_lock(f: impl FnOnce(&mut SerialWriter)) {
        // Interrupts off while the line lock is held; the panic path can
        // force the lock clear if it fires mid-print.
        let was_enabled = crate::arch::hal::interrupts_enabled();
        crate::arch::hal::disable_interrupts();
        while LOCK
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        f(&mut SerialWriter);
        LOCK.store(false, Ordering::Release);
        if was_enabled {
            crate::arch::hal::enable_interrupts();
        }
    }

    pub fn force_unlock() {
        LOCK.store(false, Ordering::Release);
    }
}

#[cfg(target_os = "none")]
pub fn init() {
    uart::init();
}

#[cfg(not(target_os = "none"))]
pub fn init() {}

/// Clear the serial line lock. Only the panic handler calls this.
#[cfg(target_os = "none")]
pub fn force_unlock() {
    uart::force_unlock();
}

#[cfg(not(target_os = "none"))]
pub fn force_unlock() {}

#[doc(hidden)]
#[cfg(target_os = "none")]
pub fn _print(args: core::fmt::Arguments) {
    use core::fmt::Write;
    uart::with_lock(|w| {
        let _ = w.write_fmt(args);
    });
}

#[doc(hidden)]
#[cfg(not(target_os = "none"))]
pub fn _print(args: core::fmt::Arguments) {
    eprint!("{}", args);
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::drivers::serial::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! serial_println {
    () => { $crate::serial_print!("\n") };
    ($($arg:tt)*) => {
        $crate::serial_print!("{}\n", format_args!($($arg)*))
    };
}
