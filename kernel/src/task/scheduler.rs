//! Preemptive round-robin scheduler.
//!
//! Single CPU, one ready queue linked by slot index over the fixed TCB
//! table. The idle task (PID 0) owns the boot stack, is never enqueued,
//! and runs only when the queue is empty. Preemption happens when the
//! timer ISR drains a task's quantum; everything else reschedules through
//! voluntary `proc_yield` calls.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::sync::spinlock::Spinlock;
use crate::task::process::{ProcInfo, ProcState, Tcb, MAX_PROCESSES, PROC_STACK_SIZE, TIME_SLICE};

struct ProcTable {
    procs: [Tcb; MAX_PROCESSES],
    queue_head: Option<u8>,
    queue_tail: Option<u8>,
}

const UNUSED_TCB: Tcb = Tcb::unused();

static TABLE: Spinlock<ProcTable> = Spinlock::new(ProcTable {
    procs: [UNUSED_TCB; MAX_PROCESSES],
    queue_head: None,
    queue_tail: None,
});

/// Slot index of the running task. Read lock-free from ISR context.
static CURRENT: AtomicUsize = AtomicUsize::new(0);

static NEXT_PID: AtomicU32 = AtomicU32::new(1);

/// Per-process kernel stacks. Written during creation and by the CPU while
/// the task runs; never touched through the table lock.
static mut PROC_STACKS: [[u8; PROC_STACK_SIZE]; MAX_PROCESSES] =
    [[0; PROC_STACK_SIZE]; MAX_PROCESSES];

impl ProcTable {
    fn enqueue(&mut self, slot: usize) {
        self.procs[slot].queue_next = None;
        match self.queue_tail {
            None => {
                self.queue_head = Some(slot as u8);
                self.queue_tail = Some(slot as u8);
            }
            Some(tail) => {
                self.procs[tail as usize].queue_next = Some(slot as u8);
                self.queue_tail = Some(slot as u8);
            }
        }
    }

    fn dequeue(&mut self) -> Option<usize> {
        let head = self.queue_head?;
        let slot = head as usize;
        self.queue_head = self.procs[slot].queue_next;
        if self.queue_head.is_none() {
            self.queue_tail = None;
        }
        self.procs[slot].queue_next = None;
        Some(slot)
    }

    fn remove_from_queue(&mut self, slot: usize) {
        let mut prev: Option<u8> = None;
        let mut cur = self.queue_head;
        while let Some(c) = cur {
            if c as usize == slot {
                let next = self.procs[slot].queue_next;
                match prev {
                    None => self.queue_head = next,
                    Some(p) => self.procs[p as usize].queue_next = next,
                }
                if self.queue_tail == Some(c) {
                    self.queue_tail = prev;
                }
                self.procs[slot].queue_next = None;
                return;
            }
            prev = cur;
            cur = self.procs[c as usize].queue_next;
        }
    }
}

/// Reset the table and install the idle/kernel task (PID 0) as current.
pub fn init() {
    let mut table = TABLE.lock();
    for tcb in table.procs.iter_mut() {
        *tcb = Tcb::unused();
    }
    table.queue_head = None;
    table.queue_tail = None;

    let idle = &mut table.procs[0];
    idle.pid = 0;
    idle.ppid = 0;
    idle.state = ProcState::Running;
    idle.priority = 0;
    idle.time_slice = TIME_SLICE;
    idle.set_name("kernel");

    CURRENT.store(0, Ordering::SeqCst);
    NEXT_PID.store(1, Ordering::SeqCst);
    log::info!("scheduler ready ({} slots, {}-tick quantum)", MAX_PROCESSES, TIME_SLICE);
}

/// New tasks land here on their first dispatch: run the entry function,
/// then exit cleanly if it returns.
extern "C" fn task_trampoline() -> ! {
    let entry = {
        let table = TABLE.lock();
        table.procs[CURRENT.load(Ordering::SeqCst)].entry
    };
    if entry != 0 {
        let f: fn() = unsafe { core::mem::transmute(entry) };
        f();
    }
    proc_exit(0);
    unreachable!()
}

/// Lay out a synthetic interrupt frame on a fresh kernel stack so the
/// first `switch_context` into this task "returns" into the trampoline.
#[cfg(target_os = "none")]
fn build_initial_frame(slot: usize) -> u32 {
    let stack_top =
        unsafe { (&raw mut PROC_STACKS[slot]) as *mut u8 as usize + PROC_STACK_SIZE };
    let mut sp = stack_top as *mut u32;

    unsafe {
        let mut push = |value: u32| {
            sp = sp.sub(1);
            sp.write(value);
        };
        push(0x202); // EFLAGS, IF set
        push(0x08); // CS
        push(task_trampoline as usize as u32); // EIP
        push(0); // error code
        push(0); // vector
        push(0); // EAX
        push(0); // ECX
        push(0); // EDX
        push(0); // EBX
        push(0); // ESP (pushad dummy)
        push(0); // EBP
        push(0); // ESI
        push(0); // EDI
        push(0x10); // DS
    }

    sp as u32
}

#[cfg(not(target_os = "none"))]
fn build_initial_frame(_slot: usize) -> u32 {
    0
}

/// Create a task that will run `entry`. Returns its PID, or `None` when
/// the table is full. ZOMBIE slots are recycled when no UNUSED slot is
/// left.
pub fn proc_create(name: &str, entry: fn()) -> Option<u32> {
    let mut table = TABLE.lock();

    let slot = (1..MAX_PROCESSES)
        .find(|&i| table.procs[i].state == ProcState::Unused)
        .or_else(|| {
            (1..MAX_PROCESSES).find(|&i| table.procs[i].state == ProcState::Zombie)
        })?;

    let pid = NEXT_PID.fetch_add(1, Ordering::SeqCst);
    let current_slot = CURRENT.load(Ordering::SeqCst);
    let ppid = table.procs[current_slot].pid;

    let tcb = &mut table.procs[slot];
    *tcb = Tcb::unused();
    tcb.pid = pid;
    tcb.ppid = ppid;
    tcb.state = ProcState::Created;
    tcb.priority = 1;
    tcb.time_slice = TIME_SLICE;
    tcb.entry = entry as usize;
    tcb.set_name(name);
    tcb.esp = build_initial_frame(slot);

    tcb.state = ProcState::Ready;
    table.enqueue(slot);
    Some(pid)
}

/// Voluntarily give up the CPU; the task goes to the queue tail.
/// Yield points are also signal delivery points.
pub fn proc_yield() {
    schedule();
    crate::ipc::signal::check();
}

/// Terminate the current task. The idle task cannot exit.
/// On the metal this never returns.
pub fn proc_exit(status: i32) {
    let slot = CURRENT.load(Ordering::SeqCst);
    if slot == 0 {
        return;
    }
    {
        let mut table = TABLE.lock();
        table.procs[slot].state = ProcState::Zombie;
        table.procs[slot].exit_status = status;
    }
    schedule();
    // Only reachable off-metal, where schedule() cannot actually switch.
    #[cfg(target_os = "none")]
    loop {
        crate::arch::hal::halt();
    }
}

/// Pick the next task and switch to it.
///
/// Queue head runs next; an empty queue selects the idle task. A current
/// task that is still RUNNING goes back on the queue tail as READY. The
/// table lock is released with interrupts kept disabled across the actual
/// switch; the incoming frame re-enables them.
pub fn schedule() {
    let mut table = TABLE.lock();

    let current_slot = CURRENT.load(Ordering::SeqCst);
    let next_slot = table.dequeue().unwrap_or(0);

    if next_slot == current_slot {
        // Sole runnable task: keep running, nothing to switch.
        if table.procs[current_slot].state == ProcState::Ready {
            table.procs[current_slot].state = ProcState::Running;
        }
        return;
    }

    if table.procs[current_slot].state == ProcState::Running {
        table.procs[current_slot].state = ProcState::Ready;
        if current_slot != 0 {
            table.enqueue(current_slot);
        }
    }

    table.procs[next_slot].state = ProcState::Running;
    table.procs[next_slot].time_slice = TIME_SLICE;
    CURRENT.store(next_slot, Ordering::SeqCst);

    #[cfg(target_os = "none")]
    {
        let old_esp: *mut u32 = &raw mut table.procs[current_slot].esp;
        let new_esp = table.procs[next_slot].esp;
        // Keep IF=0 through the switch; the incoming frame carries IF=1.
        // The raw pointer outlives the guard by design: single CPU, and
        // nothing can take the lock again until the switch completes.
        table.release_no_irq_restore();
        unsafe { crate::arch::x86::context::switch_context(old_esp, new_esp) }
    }
}

/// Timer ISR hook: account the tick, preempt when the quantum drains.
pub fn timer_tick() {
    let should_switch = {
        let mut table = match TABLE.try_lock() {
            Some(t) => t,
            None => return, // lock held by task context; skip this tick
        };
        let slot = CURRENT.load(Ordering::SeqCst);
        let tcb = &mut table.procs[slot];
        tcb.total_time = tcb.total_time.wrapping_add(1);
        if tcb.time_slice > 0 {
            tcb.time_slice -= 1;
        }
        if tcb.time_slice == 0 {
            tcb.time_slice = TIME_SLICE;
            true
        } else {
            false
        }
    };

    if should_switch {
        schedule();
    }
}

/// PID of the running task.
pub fn current_pid() -> u32 {
    let table = TABLE.lock();
    table.procs[CURRENT.load(Ordering::SeqCst)].pid
}

/// Slot index of the running task (used as the signal-table index).
pub fn current_slot() -> usize {
    CURRENT.load(Ordering::SeqCst)
}

/// Find the slot holding `pid`, if any live task has it.
pub fn slot_of_pid(pid: u32) -> Option<usize> {
    let table = TABLE.lock();
    table
        .procs
        .iter()
        .position(|t| t.pid == pid && t.state != ProcState::Unused)
}

/// Snapshot every live process for `ps`.
pub fn process_list() -> alloc::vec::Vec<ProcInfo> {
    let table = TABLE.lock();
    table
        .procs
        .iter()
        .enumerate()
        .filter(|(i, t)| *i == 0 || t.state != ProcState::Unused)
        .map(|(_, t)| ProcInfo {
            pid: t.pid,
            ppid: t.ppid,
            state: t.state,
            priority: t.priority,
            total_time: t.total_time,
            name: t.name,
        })
        .collect()
}

/// PIDs currently on the ready queue, in dispatch order.
pub(crate) fn ready_pids() -> alloc::vec::Vec<u32> {
    let table = TABLE.lock();
    let mut pids = alloc::vec::Vec::new();
    let mut cur = table.queue_head;
    while let Some(slot) = cur {
        pids.push(table.procs[slot as usize].pid);
        cur = table.procs[slot as usize].queue_next;
    }
    pids
}

/// Mark a task BLOCKED and pull it off the queue (used by `kill -STOP`
/// style paths and by blocking primitives that manage their own wakeup).
pub fn block_pid(pid: u32) -> bool {
    let mut table = TABLE.lock();
    if let Some(slot) = table
        .procs
        .iter()
        .position(|t| t.pid == pid && t.state != ProcState::Unused)
    {
        table.remove_from_queue(slot);
        table.procs[slot].state = ProcState::Blocked;
        true
    } else {
        false
    }
}

/// Move a BLOCKED task back to READY.
pub fn unblock_pid(pid: u32) -> bool {
    let mut table = TABLE.lock();
    if let Some(slot) = table
        .procs
        .iter()
        .position(|t| t.pid == pid && t.state == ProcState::Blocked)
    {
        table.procs[slot].state = ProcState::Ready;
        table.enqueue(slot);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() {}

    #[test]
    fn round_robin_queue_order() {
        let _guard = crate::test_sync::lock();
        init();

        let a = proc_create("a", noop).unwrap();
        let b = proc_create("b", noop).unwrap();
        let c = proc_create("c", noop).unwrap();
        assert_eq!(ready_pids(), alloc::vec![a, b, c]);

        // Idle is current; dispatch moves the head to RUNNING.
        schedule();
        assert_eq!(current_pid(), a);
        assert_eq!(ready_pids(), alloc::vec![b, c]);

        // A still-running task rotates to the tail.
        schedule();
        assert_eq!(current_pid(), b);
        assert_eq!(ready_pids(), alloc::vec![c, a]);

        schedule();
        assert_eq!(current_pid(), c);
        assert_eq!(ready_pids(), alloc::vec![a, b]);
    }

    #[test]
    fn exit_makes_zombie_and_reschedules() {
        let _guard = crate::test_sync::lock();
        init();

        let a = proc_create("a", noop).unwrap();
        let _b = proc_create("b", noop).unwrap();
        schedule();
        assert_eq!(current_pid(), a);

        proc_exit(7);
        // a is gone from rotation; b runs.
        assert_ne!(current_pid(), a);
        let list = process_list();
        let za = list.iter().find(|p| p.pid == a).unwrap();
        assert_eq!(za.state, ProcState::Zombie);
        assert!(!ready_pids().contains(&a));
    }

    #[test]
    fn zombie_slots_are_recycled() {
        let _guard = crate::test_sync::lock();
        init();

        // Fill every slot
        let mut pids = alloc::vec::Vec::new();
        for i in 0..MAX_PROCESSES - 1 {
            pids.push(proc_create("filler", noop).unwrap_or_else(|| panic!("slot {}", i)));
        }
        assert!(proc_create("overflow", noop).is_none());

        // Kill one, table has room again
        schedule();
        let victim = current_pid();
        proc_exit(0);
        assert!(proc_create("reuse", noop).is_some());
        assert!(victim != 0);
    }

    #[test]
    fn idle_selected_when_queue_empty() {
        let _guard = crate::test_sync::lock();
        init();
        let a = proc_create("a", noop).unwrap();
        schedule();
        assert_eq!(current_pid(), a);
        proc_exit(0);
        // Queue empty: idle (PID 0) takes over.
        assert_eq!(current_pid(), 0);
    }

    #[test]
    fn timer_tick_preempts_after_quantum() {
        let _guard = crate::test_sync::lock();
        init();
        let a = proc_create("a", noop).unwrap();
        let b = proc_create("b", noop).unwrap();
        schedule();
        assert_eq!(current_pid(), a);

        for _ in 0..TIME_SLICE {
            timer_tick();
        }
        assert_eq!(current_pid(), b);
        for _ in 0..TIME_SLICE {
            timer_tick();
        }
        assert_eq!(current_pid(), a);
    }

    #[test]
    fn block_unblock_roundtrip() {
        let _guard = crate::test_sync::lock();
        init();
        let a = proc_create("a", noop).unwrap();
        assert!(block_pid(a));
        assert!(!ready_pids().contains(&a));
        assert!(unblock_pid(a));
        assert!(ready_pids().contains(&a));
    }
}
