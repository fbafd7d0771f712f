//! Process management: TCB table, ready queue, context switching.

pub mod process;
pub mod scheduler;

pub use process::{ProcState, MAX_PROCESSES};
pub use scheduler::{
    current_pid, proc_create, proc_exit, proc_yield, schedule,
};

/// Initialize the process table and install the idle/kernel task.
pub fn init() {
    scheduler::init();
}
