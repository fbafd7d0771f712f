#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]
#![allow(dead_code)]

extern crate alloc;

mod arch;
mod auth;
mod drivers;
mod fs;
mod ipc;
mod memory;
mod net;
mod panic;
mod shell;
mod sync;
mod syscall;
mod task;

// Boot stub: multiboot header + a 64 KiB boot stack, then into Rust.
#[cfg(target_os = "none")]
core::arch::global_asm!(
    r#"
    .pushsection .multiboot, "a"
    .align 4
    .long 0x1BADB002
    .long 0x00000003
    .long -(0x1BADB002 + 0x00000003)
    .popsection

    .section .bss
    .align 16
    boot_stack_bottom:
    .skip 65536
    boot_stack_top:

    .section .text
    .global kernel_entry
    kernel_entry:
        cli
        lea esp, [boot_stack_top]
        xor ebp, ebp
        call kernel_main
    1:
        hlt
        jmp 1b
    "#
);

#[cfg(target_os = "none")]
#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    // Phase 1: early output
    drivers::serial::init();
    drivers::logger::init();
    serial_println!("");
    serial_println!("==============================");
    serial_println!("  Bastion OS Kernel v0.1");
    serial_println!("==============================");

    drivers::vga_text::init();
    drivers::console::banner();

    // Phase 2: CPU setup
    arch::x86::idt::init();
    log::info!("IDT initialized (256 entries + syscall int 0x80)");
    arch::x86::pit::init(100);
    log::info!("PIT configured at 100 Hz");

    // Phase 3: memory
    memory::init();

    // Phase 4: subsystems
    fs::ramfs::init();
    auth::init();
    task::init();
    ipc::pipe::init();
    ipc::signal::init();
    syscall::init();

    // Phase 5: NE2000 NIC + network stack
    if drivers::ne2000::init() {
        net::init();
    } else {
        log::warn!("NE2000 not found, network disabled");
    }

    // Phase 6: IRQ handlers + interrupts on
    arch::x86::idt::register_handler(32, irq_timer);
    arch::x86::idt::register_handler(33, irq_keyboard);
    unsafe { core::arch::asm!("sti") }
    log::info!("interrupts enabled (timer + keyboard)");

    serial_println!("");
    serial_println!("Bastion OS initialization complete.");

    // Phase 7: interactive shell (runs in the idle/kernel task, PID 0)
    shell::run()
}

// IRQ handler functions for dynamic dispatch

/// Timer IRQ 0: timekeeping, preemption accounting, signal delivery.
#[cfg(target_os = "none")]
fn irq_timer(_frame: &mut arch::x86::idt::InterruptFrame) {
    arch::x86::pit::tick();
    task::scheduler::timer_tick();
    ipc::signal::check();
}

#[cfg(target_os = "none")]
fn irq_keyboard(_frame: &mut arch::x86::idt::InterruptFrame) {
    let scancode = unsafe { arch::x86::port::inb(0x60) };
    drivers::keyboard::handle_scancode(scancode);
}

/// Hosted fallback: the same kernel subsystems driven by a stdin REPL.
/// Useful for exercising the shell, filesystem, and network stack off-metal.
#[cfg(not(target_os = "none"))]
fn main() {
    use std::io::{BufRead, Write};

    drivers::logger::init();
    memory::init();
    fs::ramfs::init();
    auth::init();
    task::init();
    ipc::pipe::init();
    ipc::signal::init();
    drivers::netdev::register_test_nic();
    net::init();

    println!("Bastion OS (hosted shell; build for targets/i686-bastion.json to boot)");
    let stdin = std::io::stdin();
    loop {
        print!("bastion# ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        shell::execute(line.trim_end_matches('\n'));
        print!("{}", drivers::console::take_screen());
    }
}

#[cfg(test)]
pub(crate) mod test_sync {
    use std::sync::{Mutex, MutexGuard};

    /// Kernel tables are process-global, exactly as on the metal; stateful
    /// tests serialize on this lock instead of pretending they are instanced.
    static LOCK: Mutex<()> = Mutex::new(());

    pub fn lock() -> MutexGuard<'static, ()> {
        LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }
}
