//! Cache hit/miss threshold calibration and timing-vector analysis
//! (Component E).

use crate::arch::{clflush, maccess, mfence, probe_end, probe_start};
use crate::log::{log_debug, log_warning};

const CALIBRATION_ROUNDS: usize = 1000;
/// Same permutation constants used by the Flush+Reload watcher, masked
/// into a 4 KiB page so the calibration touches a spread of offsets
/// without risking a page crossing.
const CALIBRATION_OFFSET_MASK: usize = 0xF80;

/// Empirically derives a hit/miss cycle threshold.
///
/// Picks a 4 KiB-aligned scratch region — the page containing `target` if
/// given, otherwise a freshly allocated and initialized heap page — and
/// measures `CALIBRATION_ROUNDS` hit/miss pairs at pseudo-random offsets,
/// retaining per-round minima.
///
/// # Safety
/// If `target` is `Some`, it must point into a live, readable allocation —
/// the whole containing 4 KiB page is accessed.
pub unsafe fn calibrate_threshold(target: Option<*const u8>) -> u64 {
    let mut min_hit = u64::MAX;
    let mut min_miss = u64::MAX;

    let owned_page;
    let base: *const u8 = match target {
        Some(t) => {
            owned_page = None;
            ((t as usize) & !0xFFF) as *const u8
        }
        None => {
            let mut page = vec![0u8; 4096];
            for (i, b) in page.iter_mut().enumerate() {
                *b = i as u8;
            }
            let ptr = page.as_ptr();
            owned_page = Some(page);
            ptr
        }
    };

    for i in 0..CALIBRATION_ROUNDS {
        let offset = (i.wrapping_mul(167).wrapping_add(13)) & CALIBRATION_OFFSET_MASK;
        let p = base.add(offset);

        clflush(p);
        let start = probe_start();
        maccess(p);
        let end = probe_end();
        let duration = end.wrapping_sub(start);
        if duration > 0 && duration < min_miss {
            min_miss = duration;
        }

        let start = probe_start();
        maccess(p);
        let end = probe_end();
        let duration = end.wrapping_sub(start);
        if duration > 0 && duration < min_hit {
            min_hit = duration;
        }
    }

    drop(owned_page);

    log_debug!("Calibration complete: min hit = {min_hit}, min miss = {min_miss}");

    if min_miss < min_hit + 50 {
        log_warning!(
            "Calibration gap too small (min hit = {min_hit}, min miss = {min_miss}); \
             substituting a synthetic miss floor"
        );
        min_miss = min_hit + 200;
    }

    (min_hit + min_miss) / 2
}

/// Sanity-checks a calibrated threshold against a single memory location:
/// flushes it, times a reload, and reports whether the environment is
/// capable of distinguishing hit from miss at that threshold.
///
/// # Safety
/// `target` must be valid for reads of at least 1 byte.
pub unsafe fn audit(target: *const u8, threshold: u64) -> bool {
    clflush(target);
    mfence();
    let start = probe_start();
    maccess(target);
    let end = probe_end();
    end.wrapping_sub(start) >= threshold
}

/// Record of a cache-timing analysis run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheReport {
    pub threshold: u64,
    pub effective_threshold: u64,
    pub timings: Vec<u64>,
    pub winner_idx: i64,
    pub winner_val: u64,
    pub gap: u64,
    pub hits_count: usize,
}

impl CacheReport {
    pub fn count(&self) -> usize {
        self.timings.len()
    }
}

/// Derives a [`CacheReport`] from a raw timing vector and a baseline
/// threshold: finds the global minimum ("winner") and runner-up, refines
/// the threshold using the gap between them when the gap is decisive
/// (>= 50 cycles), then counts elements at or below the refined threshold.
pub fn analyze(timings: &[u64], threshold: u64) -> CacheReport {
    let mut winner_val = u64::MAX;
    let mut winner_idx: i64 = -1;
    let mut runner_up_val = u64::MAX;

    for (i, &t) in timings.iter().enumerate() {
        if t < winner_val {
            runner_up_val = winner_val;
            winner_val = t;
            winner_idx = i as i64;
        } else if t < runner_up_val {
            runner_up_val = t;
        }
    }

    let gap = if winner_idx != -1 && runner_up_val != u64::MAX {
        runner_up_val - winner_val
    } else {
        0
    };

    let effective_threshold = if gap >= 50 {
        winner_val + gap / 2
    } else {
        threshold
    };

    let hits_count = timings
        .iter()
        .filter(|&&t| t <= effective_threshold)
        .count();

    let mut report = CacheReport {
        threshold,
        effective_threshold,
        timings: timings.to_vec(),
        winner_idx,
        winner_val,
        gap,
        hits_count,
    };

    if report.hits_count == 0 && report.gap >= 50 && report.winner_idx != -1 {
        report.hits_count = 1;
    } else if report.winner_val > report.effective_threshold {
        report.winner_idx = -1;
        report.hits_count = 0;
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_ideal_data_finds_decisive_winner() {
        let mut timings = vec![220u64; 128];
        timings[42] = 40;
        let report = analyze(&timings, 150);

        assert_eq!(report.winner_idx, 42);
        assert_eq!(report.hits_count, 1);
        assert!(report.gap >= 50);
        assert_eq!(report.effective_threshold, 40 + report.gap / 2);
    }

    #[test]
    fn analyze_rejects_winner_above_effective_threshold() {
        let timings = vec![1000u64, 1010, 1020];
        let report = analyze(&timings, 50);
        assert_eq!(report.winner_idx, -1);
        assert_eq!(report.hits_count, 0);
    }

    #[test]
    fn analyze_empty_timings() {
        let report = analyze(&[], 100);
        assert_eq!(report.winner_idx, -1);
        assert_eq!(report.hits_count, 0);
        assert_eq!(report.gap, 0);
    }
}
