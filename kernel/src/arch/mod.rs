//! Architecture-specific modules.
//!
//! Platform-agnostic code should use `arch::hal::*` instead of
//! directly referencing `arch::x86::*`.

#[cfg(target_os = "none")]
pub mod x86;

pub mod hal;
