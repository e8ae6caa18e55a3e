//! Logging facade (§6 collaborator).
//!
//! Severity levels `DEBUG < INFO < WARNING < ERROR` are mapped onto
//! `tracing`'s own levels. Filtering and formatting are delegated
//! entirely to whatever `tracing` subscriber the binary installs; this
//! module only adds the two behaviors the spec calls out that plain
//! `tracing` macros don't give you for free: a throttled status line and
//! call-site-once logging.

use std::io;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Minimum interval between `status!` line rewrites (10 updates/second).
const STATUS_INTERVAL: Duration = Duration::from_millis(100);

fn status_gate() -> &'static Mutex<Option<Instant>> {
    static GATE: OnceLock<Mutex<Option<Instant>>> = OnceLock::new();
    GATE.get_or_init(|| Mutex::new(None))
}

/// Rewrites a single terminal line, throttled to at most 10 updates/second.
///
/// Call sites further apart than the throttle interval always print;
/// closer ones are dropped rather than queued, so the line reflects the
/// most recent state rather than replaying stale intermediate ones.
pub fn status(args: std::fmt::Arguments<'_>) {
    let mut last = status_gate().lock().unwrap();
    let now = Instant::now();
    let due = match *last {
        Some(prev) => now.duration_since(prev) >= STATUS_INTERVAL,
        None => true,
    };
    if !due {
        return;
    }
    *last = Some(now);
    drop(last);
    eprint!("\r\x1b[K{args}");
    let _ = io::Write::flush(&mut io::stderr());
}

/// Appends the current OS error (`errno`) to an error-level log line.
pub fn exception(args: std::fmt::Arguments<'_>) {
    let err = io::Error::last_os_error();
    tracing::error!("{args}: {err}");
}

macro_rules! log_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}
macro_rules! log_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}
macro_rules! log_warning {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}
macro_rules! log_error {
    ($($arg:tt)*) => { tracing::error!($($arg)*) };
}
macro_rules! log_status {
    ($($arg:tt)*) => { $crate::log::status(format_args!($($arg)*)) };
}
macro_rules! log_exception {
    ($($arg:tt)*) => { $crate::log::exception(format_args!($($arg)*)) };
}

/// Logs at INFO only the first time a given call site executes.
macro_rules! log_info_once {
    ($($arg:tt)*) => {{
        static ONCE: std::sync::Once = std::sync::Once::new();
        ONCE.call_once(|| tracing::info!($($arg)*));
    }};
}

/// Logs at WARNING only the first time a given call site executes.
macro_rules! log_warning_once {
    ($($arg:tt)*) => {{
        static ONCE: std::sync::Once = std::sync::Once::new();
        ONCE.call_once(|| tracing::warn!($($arg)*));
    }};
}

pub(crate) use {
    log_debug, log_error, log_exception, log_info, log_info_once, log_status, log_warning,
    log_warning_once,
};
