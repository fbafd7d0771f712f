//! Inter-process communication: pipes and signals.

pub mod pipe;
pub mod signal;
