//! Task Control Block definitions.

/// Maximum number of processes, idle task included.
pub const MAX_PROCESSES: usize = 64;

/// Kernel stack size per process.
pub const PROC_STACK_SIZE: usize = 4096;

/// Scheduler quantum in timer ticks (10 ticks at 100 Hz = 100 ms).
pub const TIME_SLICE: u32 = 10;

/// Process lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Created,
    Ready,
    Running,
    Blocked,
    Zombie,
}

/// Task Control Block. Lives in a fixed table; the ready queue links
/// entries by slot index rather than by pointer.
pub struct Tcb {
    pub pid: u32,
    pub ppid: u32,
    /// Saved stack pointer (top of the synthetic or preempted frame).
    pub esp: u32,
    pub state: ProcState,
    pub priority: u8,
    /// Ticks left in the current quantum.
    pub time_slice: u32,
    /// Total ticks of CPU time consumed.
    pub total_time: u32,
    /// Entry point, used by the task trampoline on first run.
    pub entry: usize,
    /// Exit status recorded at `proc_exit`.
    pub exit_status: i32,
    pub name: [u8; 32],
    /// Next slot in the ready queue, if queued.
    pub queue_next: Option<u8>,
}

impl Tcb {
    pub const fn unused() -> Self {
        Tcb {
            pid: 0,
            ppid: 0,
            esp: 0,
            state: ProcState::Unused,
            priority: 0,
            time_slice: 0,
            total_time: 0,
            entry: 0,
            exit_status: 0,
            name: [0; 32],
            queue_next: None,
        }
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = [0; 32];
        let bytes = name.as_bytes();
        let len = bytes.len().min(31);
        self.name[..len].copy_from_slice(&bytes[..len]);
    }

    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(31);
        core::str::from_utf8(&self.name[..len]).unwrap_or("???")
    }
}

/// Snapshot of one process for `ps` and diagnostics.
#[derive(Clone)]
pub struct ProcInfo {
    pub pid: u32,
    pub ppid: u32,
    pub state: ProcState,
    pub priority: u8,
    pub total_time: u32,
    pub name: [u8; 32],
}

impl ProcInfo {
    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(31);
        core::str::from_utf8(&self.name[..len]).unwrap_or("???")
    }

    pub fn state_str(&self) -> &'static str {
        match self.state {
            ProcState::Unused => "UNUSED",
            ProcState::Created => "CREATED",
            ProcState::Ready => "READY",
            ProcState::Running => "RUNNING",
            ProcState::Blocked => "BLOCKED",
            ProcState::Zombie => "ZOMBIE",
        }
    }
}
