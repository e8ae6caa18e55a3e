use std::io;

use thiserror::Error;

/// Errors surfaced at the true I/O boundary.
///
/// Most of this crate's operations are contractually infallible: payload
/// patches are no-ops on bad input, oracle queries return `-1`, and tube
/// receives return `0` on timeout/EOF. `AxiumError` exists only where the
/// spec explicitly routes an OS error back to the caller (process spawn).
#[derive(Debug, Error)]
pub enum AxiumError {
    #[error("failed to create pipe: {0}")]
    Pipe(#[source] io::Error),

    #[error("fork failed: {0}")]
    Fork(#[source] io::Error),

    #[error("child failed to exec: {0}")]
    Exec(#[source] io::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
