//! System call dispatch (`int 0x80`).
//!
//! Number in EAX, arguments in EBX/ECX/EDX, result written back to the
//! saved EAX. Unknown numbers return -1.

use core::sync::atomic::{AtomicPtr, Ordering};

pub const SYS_EXIT: u32 = 0;
pub const SYS_FORK: u32 = 1;
pub const SYS_READ: u32 = 2;
pub const SYS_WRITE: u32 = 3;
pub const SYS_OPEN: u32 = 4;
pub const SYS_CLOSE: u32 = 5;
pub const SYS_EXEC: u32 = 6;
pub const SYS_GETPID: u32 = 7;
pub const SYS_YIELD: u32 = 8;
pub const SYS_SLEEP: u32 = 9;
pub const SYS_PS: u32 = 10;

const MAX_SYSCALLS: usize = 32;

/// Syscall handler signature: three raw argument registers in, status out.
pub type SyscallFn = fn(u32, u32, u32) -> i32;

static SYSCALL_TABLE: [AtomicPtr<()>; MAX_SYSCALLS] = {
    const NULL: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());
    [NULL; MAX_SYSCALLS]
};

/// Install a handler for a syscall number. Numbers outside the table are
/// rejected.
pub fn register(num: u32, handler: SyscallFn) -> bool {
    if num as usize >= MAX_SYSCALLS {
        return false;
    }
    SYSCALL_TABLE[num as usize].store(handler as *mut (), Ordering::SeqCst);
    true
}

/// Look up and invoke a syscall. -1 for unknown numbers.
pub fn dispatch(num: u32, arg1: u32, arg2: u32, arg3: u32) -> i32 {
    if num as usize >= MAX_SYSCALLS {
        return -1;
    }
    let ptr = SYSCALL_TABLE[num as usize].load(Ordering::SeqCst);
    if ptr.is_null() {
        return -1;
    }
    let f: SyscallFn = unsafe { core::mem::transmute(ptr) };
    f(arg1, arg2, arg3)
}

// ── Handlers ────────────────────────────────────────────────────────

fn sys_exit(status: u32, _a2: u32, _a3: u32) -> i32 {
    crate::task::proc_exit(status as i32);
    0
}

fn sys_getpid(_a1: u32, _a2: u32, _a3: u32) -> i32 {
    crate::task::current_pid() as i32
}

fn sys_yield(_a1: u32, _a2: u32, _a3: u32) -> i32 {
    crate::task::proc_yield();
    0
}

/// `write(fd, buf, count)`: fds 1 and 2 reach the console.
fn sys_write(fd: u32, buf: u32, count: u32) -> i32 {
    if fd != 1 && fd != 2 {
        return -1;
    }
    for i in 0..count {
        let byte = unsafe { ((buf as usize + i as usize) as *const u8).read() };
        if byte == 0 {
            return i as i32;
        }
        crate::drivers::console::write_byte(byte);
    }
    count as i32
}

/// `read(fd, buf, count)`: fd 0 reads one keyboard line at most.
fn sys_read(fd: u32, buf: u32, count: u32) -> i32 {
    if fd != 0 {
        return -1;
    }
    for i in 0..count {
        let c = crate::drivers::keyboard::getchar();
        unsafe { ((buf as usize + i as usize) as *mut u8).write(c) };
        if c == b'\n' {
            return (i + 1) as i32;
        }
    }
    count as i32
}

/// Debug helper: dump the process table.
fn sys_ps(_a1: u32, _a2: u32, _a3: u32) -> i32 {
    crate::shell::commands::cmd_ps("");
    0
}

/// Register the handler set and hook vector 0x80.
pub fn init() {
    register(SYS_EXIT, sys_exit);
    register(SYS_READ, sys_read);
    register(SYS_WRITE, sys_write);
    register(SYS_GETPID, sys_getpid);
    register(SYS_YIELD, sys_yield);
    register(SYS_PS, sys_ps);

    #[cfg(target_os = "none")]
    crate::arch::x86::idt::register_handler(0x80, syscall_entry);

    log::info!("syscalls registered (int 0x80)");
}

/// INT 0x80 handler: route by EAX, return value in the saved EAX.
#[cfg(target_os = "none")]
fn syscall_entry(frame: &mut crate::arch::x86::idt::InterruptFrame) {
    frame.eax = dispatch(frame.eax, frame.ebx, frame.ecx, frame.edx) as u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(a: u32, b: u32, c: u32) -> i32 {
        (a + b + c) as i32
    }

    #[test]
    fn dispatch_routes_and_rejects() {
        let _guard = crate::test_sync::lock();
        crate::task::init();
        init();

        assert!(register(SYS_SLEEP, probe));
        assert_eq!(dispatch(SYS_SLEEP, 1, 2, 3), 6);

        // Unknown or unregistered numbers yield -1.
        assert_eq!(dispatch(31, 0, 0, 0), -1);
        assert_eq!(dispatch(99, 0, 0, 0), -1);
        assert!(!register(99, probe));

        // getpid in the idle context is PID 0.
        assert_eq!(dispatch(SYS_GETPID, 0, 0, 0), 0);
    }
}
