//! Interrupt Descriptor Table (IDT) and interrupt dispatch.
//!
//! 256 gates: CPU exceptions (0-31), hardware IRQs remapped to 32-47, and
//! the `int 0x80` syscall gate (DPL 3). The assembly stubs are generated
//! from a declarative macro table and push one uniform frame layout; both
//! exception and IRQ paths funnel into Rust dispatchers that consult a
//! per-vector handler table.

use core::arch::asm;
use core::mem::size_of;
use core::sync::atomic::{AtomicPtr, Ordering};

use static_assertions::const_assert_eq;

use crate::arch::x86::pic;

/// Total IDT entries (full x86 vector range).
const IDT_ENTRIES: usize = 256;
/// GDT selector for the Ring 0 code segment.
const KERNEL_CODE_SEG: u16 = 0x08;

// Gate type attributes
const GATE_KERNEL: u8 = 0x8E; // present, DPL=0, 32-bit interrupt gate
const GATE_USER: u8 = 0xEE; // present, DPL=3, 32-bit interrupt gate (syscall)

/// 32-bit IDT gate descriptor (8 bytes).
#[repr(C, packed)]
#[derive(Copy, Clone)]
struct IdtEntry {
    base_low: u16,  // handler address bits 0-15
    selector: u16,  // kernel code segment selector
    zero: u8,       // always 0
    flags: u8,      // gate type and attributes
    base_high: u16, // handler address bits 16-31
}

#[repr(C, packed)]
struct IdtDescriptor {
    limit: u16,
    base: u32,
}

static mut IDT: [IdtEntry; IDT_ENTRIES] = [IdtEntry {
    base_low: 0,
    selector: 0,
    zero: 0,
    flags: 0,
    base_high: 0,
}; IDT_ENTRIES];

static mut IDT_DESC: IdtDescriptor = IdtDescriptor { limit: 0, base: 0 };

/// Uniform interrupt frame pushed by the assembly stubs.
///
/// Layout is ABI-critical: `ds`, the `pushad` register block, the vector
/// and error code pushed by the stub, then the CPU-pushed `eip/cs/eflags`
/// (plus `useresp/ss` on privilege transitions only — everything here runs
/// ring 0, so those two fields are not valid to read).
#[repr(C)]
pub struct InterruptFrame {
    pub ds: u32,
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub int_no: u32,
    pub err_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub useresp: u32,
    pub ss: u32,
}

const_assert_eq!(size_of::<InterruptFrame>(), 64);

/// Per-vector handler function type.
pub type IsrHandler = fn(&mut InterruptFrame);

/// One AtomicPtr per vector, null when no handler is registered.
/// Lock-free so registration and IRQ-context dispatch never contend.
static HANDLERS: [AtomicPtr<()>; IDT_ENTRIES] = {
    const NULL: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());
    [NULL; IDT_ENTRIES]
};

static EXCEPTION_MESSAGES: [&str; 32] = [
    "Division By Zero",
    "Debug",
    "Non Maskable Interrupt",
    "Breakpoint",
    "Overflow",
    "Bound Range Exceeded",
    "Invalid Opcode",
    "Device Not Available",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack-Segment Fault",
    "General Protection Fault",
    "Page Fault",
    "Reserved",
    "x87 FPU Error",
    "Alignment Check",
    "Machine Check",
    "SIMD Floating-Point Exception",
    "Virtualization Exception",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
];

// Stub table: one GAS macro per stub class, invoked per vector.
// Exceptions 8, 10-14, and 17 get a CPU-pushed error code; every other
// stub pushes a zero so the frame layout stays uniform.
core::arch::global_asm!(
    r#"
    .macro isr_noerr n
    .global isr\n
    isr\n:
        push 0
        push \n
        jmp isr_common
    .endm

    .macro isr_err n
    .global isr\n
    isr\n:
        push \n
        jmp isr_common
    .endm

    .macro irq_stub n, v
    .global irq\n
    irq\n:
        push 0
        push \v
        jmp irq_common
    .endm

    isr_noerr 0
    isr_noerr 1
    isr_noerr 2
    isr_noerr 3
    isr_noerr 4
    isr_noerr 5
    isr_noerr 6
    isr_noerr 7
    isr_err   8
    isr_noerr 9
    isr_err   10
    isr_err   11
    isr_err   12
    isr_err   13
    isr_err   14
    isr_noerr 15
    isr_noerr 16
    isr_err   17
    isr_noerr 18
    isr_noerr 19
    isr_noerr 20
    isr_noerr 21
    isr_noerr 22
    isr_noerr 23
    isr_noerr 24
    isr_noerr 25
    isr_noerr 26
    isr_noerr 27
    isr_noerr 28
    isr_noerr 29
    isr_noerr 30
    isr_noerr 31
    isr_noerr 128

    irq_stub 0, 32
    irq_stub 1, 33
    irq_stub 2, 34
    irq_stub 3, 35
    irq_stub 4, 36
    irq_stub 5, 37
    irq_stub 6, 38
    irq_stub 7, 39
    irq_stub 8, 40
    irq_stub 9, 41
    irq_stub 10, 42
    irq_stub 11, 43
    irq_stub 12, 44
    irq_stub 13, 45
    irq_stub 14, 46
    irq_stub 15, 47

    isr_common:
        pushad
        push ds
        mov ax, 0x10
        mov ds, ax
        mov es, ax
        push esp
        call isr_dispatch
        add esp, 4
        pop ds
        popad
        add esp, 8
        iretd

    irq_common:
        pushad
        push ds
        mov ax, 0x10
        mov ds, ax
        mov es, ax
        push esp
        call irq_dispatch
        add esp, 4
        pop ds
        popad
        add esp, 8
        iretd
    "#
);

extern "C" {
    fn isr0();
    fn isr1();
    fn isr2();
    fn isr3();
    fn isr4();
    fn isr5();
    fn isr6();
    fn isr7();
    fn isr8();
    fn isr9();
    fn isr10();
    fn isr11();
    fn isr12();
    fn isr13();
    fn isr14();
    fn isr15();
    fn isr16();
    fn isr17();
    fn isr18();
    fn isr19();
    fn isr20();
    fn isr21();
    fn isr22();
    fn isr23();
    fn isr24();
    fn isr25();
    fn isr26();
    fn isr27();
    fn isr28();
    fn isr29();
    fn isr30();
    fn isr31();
    fn isr128();

    fn irq0();
    fn irq1();
    fn irq2();
    fn irq3();
    fn irq4();
    fn irq5();
    fn irq6();
    fn irq7();
    fn irq8();
    fn irq9();
    fn irq10();
    fn irq11();
    fn irq12();
    fn irq13();
    fn irq14();
    fn irq15();
}

const EXCEPTION_STUBS: [unsafe extern "C" fn(); 32] = [
    isr0, isr1, isr2, isr3, isr4, isr5, isr6, isr7, isr8, isr9, isr10, isr11,
    isr12, isr13, isr14, isr15, isr16, isr17, isr18, isr19, isr20, isr21,
    isr22, isr23, isr24, isr25, isr26, isr27, isr28, isr29, isr30, isr31,
];

const IRQ_STUBS: [unsafe extern "C" fn(); 16] = [
    irq0, irq1, irq2, irq3, irq4, irq5, irq6, irq7, irq8, irq9, irq10, irq11,
    irq12, irq13, irq14, irq15,
];

fn set_gate(num: usize, handler: unsafe extern "C" fn(), selector: u16, flags: u8) {
    let base = handler as *const () as u32;
    unsafe {
        IDT[num] = IdtEntry {
            base_low: (base & 0xFFFF) as u16,
            selector,
            zero: 0,
            flags,
            base_high: ((base >> 16) & 0xFFFF) as u16,
        };
    }
}

/// Install the IDT: remap the PIC, populate exception, IRQ, and syscall
/// gates, then load the IDTR. Safe to call again; re-running simply
/// rewrites the same table.
pub fn init() {
    pic::remap();

    for (i, stub) in EXCEPTION_STUBS.iter().enumerate() {
        set_gate(i, *stub, KERNEL_CODE_SEG, GATE_KERNEL);
    }
    for (i, stub) in IRQ_STUBS.iter().enumerate() {
        set_gate(32 + i, *stub, KERNEL_CODE_SEG, GATE_KERNEL);
    }

    // Syscall gate: ring 3 callable
    set_gate(0x80, isr128, KERNEL_CODE_SEG, GATE_USER);

    unsafe {
        IDT_DESC = IdtDescriptor {
            limit: (IDT_ENTRIES * size_of::<IdtEntry>() - 1) as u16,
            base: (&raw const IDT) as *const _ as u32,
        };
        asm!("lidt [{}]", in(reg) &raw const IDT_DESC, options(nostack, preserves_flags));
    }
}

/// Install a handler for the given vector. Later registrations overwrite
/// earlier ones. Vectors outside the table are rejected.
pub fn register_handler(vector: usize, handler: IsrHandler) -> bool {
    if vector >= IDT_ENTRIES {
        return false;
    }
    HANDLERS[vector].store(handler as *mut (), Ordering::SeqCst);
    true
}

fn handler_for(vector: usize) -> Option<IsrHandler> {
    let ptr = HANDLERS[vector].load(Ordering::SeqCst);
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { core::mem::transmute::<*mut (), IsrHandler>(ptr) })
    }
}

/// Exception + syscall dispatcher called from the assembly stubs.
///
/// An exception with no registered handler is fatal: named diagnostic,
/// interrupts off, halt.
#[no_mangle]
extern "C" fn isr_dispatch(frame: &mut InterruptFrame) {
    let vector = frame.int_no as usize;

    if let Some(handler) = handler_for(vector) {
        handler(frame);
        return;
    }

    if vector < 32 {
        let eip = frame.eip;
        let cs = frame.cs;
        let eflags = frame.eflags;
        crate::kprintln_color!(
            crate::drivers::console::Color::LightRed,
            "\n!!! EXCEPTION: {} (int {}, err {})",
            EXCEPTION_MESSAGES[vector],
            vector,
            frame.err_code
        );
        crate::kprintln!("EIP: {:#x}  CS: {:#x}", eip, cs);
        crate::kprintln!("EFLAGS: {:#x}", eflags);
        crate::serial_println!(
            "FATAL: {} (int {}, err {}) EIP={:#010x} CS={:#x} EFLAGS={:#010x}",
            EXCEPTION_MESSAGES[vector],
            vector,
            frame.err_code,
            eip,
            cs,
            eflags
        );
        crate::kprintln_color!(crate::drivers::console::Color::LightRed, "System halted.");
        loop {
            unsafe { asm!("cli; hlt") }
        }
    }
    // Unhandled non-exception vectors are ignored.
}

/// Hardware IRQ dispatcher. EOI is sent BEFORE the handler runs so
/// handlers may block or reschedule without wedging the PIC.
#[no_mangle]
extern "C" fn irq_dispatch(frame: &mut InterruptFrame) {
    pic::send_eoi(frame.int_no);

    if let Some(handler) = handler_for(frame.int_no as usize) {
        handler(frame);
    }
}
