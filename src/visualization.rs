//! Serializable report views for external tooling.
//!
//! Gated behind the `visualization` feature (which implies `serde`); this
//! module has no logic of its own, only `From` conversions into
//! JSON-friendly shapes matching what an external dashboard expects.

use serde::Serialize;

use crate::sidechannel::{CacheReport, WatchReport};

/// JSON view of a [`CacheReport`]. No `type` tag — the cache-report shape
/// is the fields below and nothing else; `WatchReportView` is the one that
/// carries a `type` discriminator.
#[derive(Debug, Clone, Serialize)]
pub struct CacheReportView {
    pub threshold: u64,
    pub effective_threshold: u64,
    pub winner_idx: i64,
    pub winner_val: u64,
    pub gap: u64,
    pub hits_count: usize,
    pub count: usize,
    pub timings: Vec<u64>,
}

impl From<&CacheReport> for CacheReportView {
    fn from(r: &CacheReport) -> Self {
        CacheReportView {
            threshold: r.threshold,
            effective_threshold: r.effective_threshold,
            winner_idx: r.winner_idx,
            winner_val: r.winner_val,
            gap: r.gap,
            hits_count: r.hits_count,
            count: r.count(),
            timings: r.timings.clone(),
        }
    }
}

/// JSON view of a [`WatchReport`].
#[derive(Debug, Clone, Serialize)]
pub struct WatchReportView {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub count: usize,
    pub threshold: u64,
    pub total_hits: usize,
    pub hit_counts: Vec<usize>,
}

impl From<&WatchReport> for WatchReportView {
    fn from(r: &WatchReport) -> Self {
        WatchReportView {
            kind: "watch",
            count: r.count,
            threshold: r.threshold,
            total_hits: r.total_hits,
            hit_counts: r.hit_counts.clone(),
        }
    }
}

/// Serializes a [`CacheReport`] to a pretty-printed JSON string.
pub fn cache_report_to_json(report: &CacheReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&CacheReportView::from(report))
}

/// Serializes a [`WatchReport`] to a pretty-printed JSON string.
pub fn watch_report_to_json(report: &WatchReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&WatchReportView::from(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_report_serializes_without_type_tag() {
        let report = CacheReport {
            threshold: 150,
            effective_threshold: 120,
            timings: vec![100, 200, 300],
            winner_idx: 0,
            winner_val: 100,
            gap: 100,
            hits_count: 1,
        };
        let json = cache_report_to_json(&report).expect("serialize");
        assert!(!json.contains("\"type\""));
        assert!(json.contains("\"winner_idx\": 0"));
    }

    #[test]
    fn watch_report_serializes_with_type_tag() {
        let report = WatchReport {
            threshold: 150,
            count: 10,
            total_hits: 3,
            hit_counts: vec![1, 2],
        };
        let json = watch_report_to_json(&report).expect("serialize");
        assert!(json.contains("\"type\": \"watch\""));
    }
}
