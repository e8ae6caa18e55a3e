//! Generic query-response abstraction and statistical amplification
//! (Component C).

pub mod sidechannel;

use crate::arch::delay_cycles;
use crate::log::{log_error, log_status};

pub use sidechannel::{find_best_hit, SidechannelOracle};

/// A query-response primitive: `input -> result` or `-1` on failure.
///
/// Queries are expected to be idempotent in the statistical sense — the
/// contract for [`query_stat`]/[`scan_stat`] is that repeated calls with the
/// same input are meaningful samples of the same underlying signal.
pub trait Oracle {
    fn query(&mut self, input: u64) -> i64;
}

/// Queries inputs `0..buf.len()`, writing each returned byte into `buf`.
/// Stops early on `-1` (partial count returned), or once the result equals
/// `terminator` (the terminator byte is included in the count). Returns the
/// number of bytes written.
pub fn scan<O: Oracle + ?Sized>(oracle: &mut O, buf: &mut [u8], terminator: Option<u8>) -> usize {
    let mut i = 0;
    while i < buf.len() {
        let res = oracle.query(i as u64);
        if res < 0 {
            break;
        }
        let byte = res as u8;
        buf[i] = byte;
        i += 1;
        if terminator == Some(byte) {
            break;
        }
    }
    i
}

/// The predicate that admits a statistical vote winner: a single index must
/// hold the maximum, clear `threshold`, lead the runner-up by at least
/// `max/8 + 2`, and beat the mean by at least 2x (signal-to-noise ratio).
///
/// The `/8 + 2` lead margin and its exact integer form are preserved as
/// documented in spec.md's Open Questions rather than re-derived.
pub fn confidence(votes: &[u64], threshold: u64) -> Option<usize> {
    if votes.is_empty() {
        return None;
    }

    let mut max = 0u64;
    let mut max_idx = 0usize;
    let mut num_max = 0usize;
    let mut second = 0u64;

    for (i, &v) in votes.iter().enumerate() {
        if v > max {
            second = max;
            max = v;
            max_idx = i;
            num_max = 1;
        } else if v == max {
            num_max += 1;
        } else if v > second {
            second = v;
        }
    }

    let total: u64 = votes.iter().sum();
    let avg = total / votes.len() as u64;

    let lead_required = (max >> 3) + 2;
    let has_lead = max.saturating_sub(second) >= lead_required;

    if max >= threshold && num_max == 1 && has_lead && max >= 2 * avg {
        Some(max_idx)
    } else {
        None
    }
}

/// Performs up to `rounds` queries for `input`, tallying each non-negative
/// in-range result into `votes` (which is *not* zeroed here, so callers can
/// amortize samples across calls). Checks [`confidence`] every quarter of
/// `rounds` and returns the winner as soon as one is declared; otherwise
/// returns the final verdict (winner index or `-1`).
pub fn query_stat<O: Oracle + ?Sized>(
    oracle: &mut O,
    input: u64,
    rounds: u32,
    threshold: u64,
    votes: &mut [u64],
) -> i64 {
    if votes.is_empty() {
        return -1;
    }
    let checkpoint = (rounds / 4).max(1);

    for r in 0..rounds {
        let res = oracle.query(input);
        if res >= 0 && (res as usize) < votes.len() {
            votes[res as usize] += 1;
        }
        if (r + 1) % checkpoint == 0 {
            if let Some(winner) = confidence(votes, threshold) {
                return winner as i64;
            }
        }
    }

    confidence(votes, threshold)
        .map(|w| w as i64)
        .unwrap_or(-1)
}

/// Busy-waits with the adaptive backoff schedule used between
/// [`scan_stat`] retry attempts: cooperative yield for the first 5
/// attempts, then an exponentially growing cycle delay capped at an
/// exponent of 10.
fn backoff(attempt: u32) {
    if attempt <= 5 {
        std::thread::yield_now();
    } else {
        let exponent = attempt.min(10);
        let cycles = 10_000u64.saturating_mul(1u64 << exponent);
        delay_cycles(cycles.min(u32::MAX as u64) as u32);
    }
}

/// Per-byte statistical scan: retries [`query_stat`] up to `max_retries`
/// times per index, with adaptive backoff and periodic vote decay to
/// suppress transient noise. Stops (returning the bytes written so far) the
/// first time a byte's signal can't be amplified above `threshold`.
pub fn scan_stat<O: Oracle + ?Sized>(
    oracle: &mut O,
    buf: &mut [u8],
    terminator: Option<u8>,
    rounds: u32,
    threshold: u64,
    max_retries: u32,
    votes: &mut [u64],
) -> usize {
    let decay_interval = max_retries / 3 + 1;
    let mut i = 0;

    while i < buf.len() {
        for v in votes.iter_mut() {
            *v = 0;
        }

        let mut attempt = 0u32;
        let mut res = -1i64;
        while res == -1 && attempt < max_retries {
            res = query_stat(oracle, i as u64, rounds, threshold, votes);
            if res == -1 {
                attempt += 1;
                if attempt < max_retries {
                    if attempt % 5 == 0 {
                        log_status!(
                            "Weak signal at index {i} (total samples: {}), retrying...",
                            attempt * rounds
                        );
                    }
                    backoff(attempt);
                    if attempt % decay_interval == 0 {
                        for v in votes.iter_mut() {
                            *v >>= 1;
                        }
                    }
                }
            }
        }

        if res == -1 {
            log_error!(
                "Lost signal at index {i} after {} samples.",
                max_retries * rounds
            );
            break;
        }

        buf[i] = res as u8;
        i += 1;
        if terminator == Some(res as u8) {
            break;
        }
    }

    i
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFail;
    impl Oracle for AlwaysFail {
        fn query(&mut self, _input: u64) -> i64 {
            -1
        }
    }

    struct Fixed(u8);
    impl Oracle for Fixed {
        fn query(&mut self, _input: u64) -> i64 {
            self.0 as i64
        }
    }

    #[test]
    fn scan_on_failing_oracle_writes_nothing() {
        let mut buf = [0u8; 8];
        let n = scan(&mut AlwaysFail, &mut buf, None);
        assert_eq!(n, 0);
        assert_eq!(buf, [0u8; 8]);
    }

    #[test]
    fn scan_stops_at_terminator_inclusive() {
        let mut buf = [0u8; 8];
        let n = scan(&mut Fixed(b'!'), &mut buf, Some(b'!'));
        assert_eq!(n, 1);
        assert_eq!(buf[0], b'!');
    }

    #[test]
    fn confidence_rejects_ties() {
        let votes = [10u64, 10, 0, 0];
        assert_eq!(confidence(&votes, 5), None);
    }

    #[test]
    fn confidence_accepts_clear_winner() {
        // winner 100, runner-up 10: lead = 90 >= 100/8+2=14, avg=(100+10+0+0)/4=27, 100>=54
        let votes = [100u64, 10, 0, 0];
        assert_eq!(confidence(&votes, 50), Some(0));
    }

    #[test]
    fn confidence_rejects_below_threshold() {
        let votes = [100u64, 10, 0, 0];
        assert_eq!(confidence(&votes, 200), None);
    }
}
