//! Low-level context switch.
//!
//! `switch_context` snapshots the running task as the same iret-style frame
//! the process factory synthesizes for new tasks, stores the resulting stack
//! pointer through `old_esp`, then unwinds the incoming task's frame with
//! `iretd`. A brand-new task therefore starts executing at its entry point
//! the first time it is switched to, and a preempted task resumes right
//! after its own `switch_context` call.
//!
//! The saved EFLAGS is forced to IF=1: schedule() releases the scheduler
//! lock with interrupts still disabled, and the resumed side must not
//! inherit that state.

core::arch::global_asm!(
    r#"
    .global switch_context
    switch_context:
        mov eax, [esp + 4]      // &old_esp
        mov edx, [esp + 8]      // new_esp

        pushfd
        or dword ptr [esp], 0x200
        push cs
        mov ecx, offset .Lresume
        push ecx
        push 0                  // err_code
        push 0                  // int_no
        pushad
        push ds

        mov [eax], esp
        mov esp, edx

        pop ds
        popad
        add esp, 8
        iretd

    .Lresume:
        ret
    "#
);

extern "C" {
    /// Save the current context through `old_esp`, load `new_esp`, and
    /// resume whatever frame lives there.
    pub fn switch_context(old_esp: *mut u32, new_esp: u32);
}
