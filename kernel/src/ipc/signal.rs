//! POSIX-style signals.
//!
//! Per-process pending and blocked bitmaps plus a 32-slot action table.
//! Delivery happens at well-defined points (voluntary yield, end of the
//! timer ISR): the lowest-numbered deliverable signal is consumed per
//! check. KILL and STOP can be neither caught nor blocked.

use crate::sync::spinlock::Spinlock;
use crate::task;
use crate::task::process::MAX_PROCESSES;

pub const SIGHUP: u32 = 1;
pub const SIGINT: u32 = 2;
pub const SIGQUIT: u32 = 3;
pub const SIGILL: u32 = 4;
pub const SIGTRAP: u32 = 5;
pub const SIGABRT: u32 = 6;
pub const SIGFPE: u32 = 8;
pub const SIGKILL: u32 = 9;
pub const SIGUSR1: u32 = 10;
pub const SIGSEGV: u32 = 11;
pub const SIGUSR2: u32 = 12;
pub const SIGPIPE: u32 = 13;
pub const SIGALRM: u32 = 14;
pub const SIGTERM: u32 = 15;
pub const SIGCHLD: u32 = 17;
pub const SIGCONT: u32 = 18;
pub const SIGSTOP: u32 = 19;

const MAX_SIGNALS: u32 = 32;

/// Disposition of one signal.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SigAction {
    Default,
    Ignore,
    Handler(fn(u32)),
}

/// Per-process signal state, indexed by process slot.
#[derive(Clone, Copy)]
struct SignalState {
    pending: u32,
    blocked: u32,
    actions: [SigAction; MAX_SIGNALS as usize],
}

const CLEAR_STATE: SignalState = SignalState {
    pending: 0,
    blocked: 0,
    actions: [SigAction::Default; MAX_SIGNALS as usize],
};

static STATES: Spinlock<[SignalState; MAX_PROCESSES]> =
    Spinlock::new([CLEAR_STATE; MAX_PROCESSES]);

/// Reset all signal state.
pub fn init() {
    let mut states = STATES.lock();
    for s in states.iter_mut() {
        *s = CLEAR_STATE;
    }
}

/// Clear state for one process slot (called when a slot is recycled).
pub fn reset_slot(slot: usize) {
    if slot < MAX_PROCESSES {
        STATES.lock()[slot] = CLEAR_STATE;
    }
}

/// Mark `sig` pending for the process holding `pid`.
pub fn send(pid: u32, sig: u32) -> i32 {
    if sig == 0 || sig >= MAX_SIGNALS {
        return -1;
    }
    let slot = match task::scheduler::slot_of_pid(pid) {
        Some(s) => s,
        None => return -1,
    };
    STATES.lock()[slot].pending |= 1 << sig;
    0
}

/// Raise a signal in the current process.
pub fn raise(sig: u32) -> i32 {
    send(task::current_pid(), sig)
}

/// Install a new disposition, returning the previous one. KILL and STOP
/// keep their default action no matter what.
pub fn set_action(sig: u32, action: SigAction) -> SigAction {
    if sig == 0 || sig >= MAX_SIGNALS || sig == SIGKILL || sig == SIGSTOP {
        return SigAction::Default;
    }
    let slot = task::scheduler::current_slot();
    let mut states = STATES.lock();
    let old = states[slot].actions[sig as usize];
    states[slot].actions[sig as usize] = action;
    old
}

/// Add `mask` to the blocked set, returning the previous set.
/// KILL and STOP are silently kept unblockable.
pub fn block(mask: u32) -> u32 {
    let slot = task::scheduler::current_slot();
    let mut states = STATES.lock();
    let old = states[slot].blocked;
    states[slot].blocked |= mask;
    states[slot].blocked &= !((1 << SIGKILL) | (1 << SIGSTOP));
    old
}

/// Remove `mask` from the blocked set, returning the previous set.
pub fn unblock(mask: u32) -> u32 {
    let slot = task::scheduler::current_slot();
    let mut states = STATES.lock();
    let old = states[slot].blocked;
    states[slot].blocked &= !mask;
    old
}

/// Deliver at most one pending, unblocked signal to the current process.
/// Ignored signals are consumed while scanning; the first signal with a
/// real disposition stops the scan. Called at yield points and from the
/// timer ISR tail.
pub fn check() {
    let slot = task::scheduler::current_slot();

    loop {
        // Consume one signal under the lock, act on it outside: default
        // termination reenters the scheduler, handlers are arbitrary code.
        let (sig, action) = {
            let mut states = STATES.lock();
            let state = &mut states[slot];
            let deliverable = state.pending & !state.blocked;
            if deliverable == 0 {
                return;
            }
            let sig = deliverable.trailing_zeros();
            state.pending &= !(1 << sig);
            (sig, state.actions[sig as usize])
        };

        match action {
            SigAction::Ignore => continue, // keep scanning
            SigAction::Handler(f) => {
                f(sig);
                return;
            }
            SigAction::Default => {
                match sig {
                    SIGCHLD | SIGCONT => {} // default is ignore
                    _ => task::proc_exit(128 + sig as i32),
                }
                return;
            }
        }
    }
}
