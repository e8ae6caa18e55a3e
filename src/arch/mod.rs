//! Timer and barrier primitives (Component A).
//!
//! Specified for a single hardware family: x86-64 with TSC, `clflush`,
//! `lfence`/`sfence`/`mfence`, `rdtscp`, `cpuid`, `pause`. No portable
//! fallback is provided on other architectures — timers are not the kind of
//! thing that can be emulated without changing the meaning of every
//! measurement this crate takes.
#[cfg(not(target_arch = "x86_64"))]
compile_error!("axium's side-channel core is specified for x86-64 only");

mod x86_64;

pub use x86_64::*;
