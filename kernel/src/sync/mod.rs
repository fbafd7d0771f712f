//! Synchronization primitives for the kernel.

pub mod spinlock;
