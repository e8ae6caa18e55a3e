//! Timeout sentinels and the monotonic clock (Component Z).

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// No timeout: wait forever.
pub const FOREVER: f64 = -1.0;
/// Use the tube's configured default timeout.
pub const DEFAULT: f64 = -2.0;
/// Soft cap applied to any user-supplied finite timeout (2^20 seconds).
///
/// The original source defines this but never enforces it in the receive
/// paths (spec.md Open Questions); this crate enforces it as a soft cap
/// wherever a finite timeout is converted to a deadline.
pub const MAXIMUM: f64 = 1_048_576.0;

/// Returns the current monotonic time in seconds, as a float.
///
/// Backed by `Instant`, which on Linux is `CLOCK_MONOTONIC`. Two successive
/// calls separated by real wall-clock time always differ by at least that
/// duration (property 13 in spec.md §8).
pub fn now() -> f64 {
    static EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let epoch = *EPOCH.get_or_init(Instant::now);
    Instant::now().duration_since(epoch).as_secs_f64()
}

/// Wall-clock `now()` for contexts that need an absolute timestamp rather
/// than a monotonic offset (none of the core's timing-sensitive paths use
/// this; it exists for callers building on top of the crate who want a
/// timestamp to pair with a report).
pub fn wall_clock_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Resolves a caller-supplied timeout (possibly `FOREVER`/`DEFAULT`) against
/// a tube's configured default, clamping any finite value to `MAXIMUM`.
pub(crate) fn resolve(timeout: f64, default: f64) -> f64 {
    let t = if timeout == DEFAULT { default } else { timeout };
    if t < 0.0 {
        t
    } else {
        t.min(MAXIMUM)
    }
}

/// Converts a resolved timeout into an absolute monotonic deadline, or
/// `None` for "wait forever".
pub(crate) fn deadline(timeout: f64) -> Option<f64> {
    if timeout < 0.0 {
        None
    } else {
        Some(now() + timeout)
    }
}

/// Remaining seconds until `deadline`, or `FOREVER`-equivalent `None` if
/// there is no deadline. Never negative; callers treat `<= 0.0` as expired.
pub(crate) fn remaining(deadline: Option<f64>) -> Option<f64> {
    deadline.map(|d| d - now())
}

/// Converts a remaining-seconds value into the millisecond timeout `poll(2)`
/// expects: `-1` for "forever", clamped to `i32::MAX` otherwise.
pub(crate) fn poll_millis(remaining: Option<f64>) -> i32 {
    match remaining {
        None => -1,
        Some(r) if r <= 0.0 => 0,
        Some(r) => {
            let ms = (r * 1000.0).ceil();
            if ms >= i32::MAX as f64 {
                i32::MAX
            } else {
                ms as i32
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn sentinels_are_distinct_and_negative() {
        assert!(FOREVER < 0.0);
        assert!(DEFAULT < 0.0);
        assert_ne!(FOREVER, DEFAULT);
    }

    #[test]
    fn monotonic_clock_advances() {
        let a = now();
        sleep(Duration::from_millis(10));
        let b = now();
        assert!(b - a >= 0.01);
    }

    #[test]
    fn resolve_maps_default_to_tube_default() {
        assert_eq!(resolve(DEFAULT, 5.0), 5.0);
        assert_eq!(resolve(FOREVER, 5.0), FOREVER);
        assert_eq!(resolve(10.0, 5.0), 10.0);
    }

    #[test]
    fn resolve_caps_at_maximum() {
        assert_eq!(resolve(MAXIMUM * 2.0, 1.0), MAXIMUM);
    }
}
