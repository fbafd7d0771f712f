//! x86 (i686, 32-bit protected mode) architecture support.
//!
//! IDT and interrupt dispatch, 8259 PIC, PIT timer, I/O port access,
//! and the context switch primitive.

pub mod context;
pub mod idt;
pub mod pic;
pub mod pit;
pub mod port;
