//! PID existence and visibility probes (Component J).

use std::thread::sleep;
use std::time::Duration;

use crate::timeout;

/// Checks whether a process exists, using `kill(pid, 0)` — the cheapest
/// detection method available. Returns `true` if the process exists even
/// when it's owned by another user (a permission-denied kill still proves
/// existence).
pub fn exists(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        true
    } else {
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}

/// Polls for a PID to become visible, sleeping 1ms between checks.
/// `timeout_ms` of `0` waits indefinitely; any other value bounds the wait
/// using the same monotonic clock as [`crate::timeout`].
pub fn wait_for_pid(pid: i32, timeout_ms: u64) -> bool {
    let deadline = if timeout_ms > 0 {
        Some(timeout::now() + timeout_ms as f64 / 1000.0)
    } else {
        None
    };

    loop {
        if exists(pid) {
            return true;
        }

        if let Some(deadline) = deadline {
            if timeout::now() >= deadline {
                return false;
            }
        }

        sleep(Duration::from_millis(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonpositive_pid_does_not_exist() {
        assert!(!exists(0));
        assert!(!exists(-1));
    }

    #[test]
    fn current_process_exists() {
        let pid = std::process::id() as i32;
        assert!(exists(pid));
    }

    #[test]
    fn wait_for_pid_succeeds_immediately_for_live_pid() {
        let pid = std::process::id() as i32;
        assert!(wait_for_pid(pid, 100));
    }

    #[test]
    fn wait_for_pid_times_out_on_unused_pid() {
        // A PID this large is exceedingly unlikely to be alive.
        assert!(!wait_for_pid(i32::MAX - 1, 20));
    }
}
