//! Primitives for driving exploits: timing utilities, a payload builder, a
//! generic statistical oracle, a cache/Spectre side-channel core, and a
//! process tube with full timeout support.
//!
//! Nothing in this crate targets a specific architecture beyond `x86_64`
//! (enforced at compile time by [`arch`]), and nothing here assembles or
//! ships shellcode — the side-channel and Spectre engines take victim
//! gadgets as closures supplied by the caller.

pub mod arch;
pub mod error;
pub mod log;
pub mod oracle;
pub mod payload;
pub mod sidechannel;
pub mod timeout;
pub mod tube;

#[cfg(feature = "visualization")]
pub mod visualization;

pub use error::AxiumError;
pub use oracle::{confidence, query_stat, scan, scan_stat, Oracle};
pub use payload::Payload;
pub use tube::{spawn, spawn_ext, Tube, TubeFlags};
