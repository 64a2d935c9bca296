//! Process-wide pipeline counters.

use super::{MarkerReport, RelevanceLabel};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the orchestrator and citation service.
#[derive(Debug, Default)]
pub struct PipelineStats {
    requests: AtomicU64,
    greeting: AtomicU64,
    relevant: AtomicU64,
    inappropriate: AtomicU64,
    not_relevant: AtomicU64,
    failed_requests: AtomicU64,
    stream_errors: AtomicU64,
    format_violations: AtomicU64,
    citation_requests: AtomicU64,
    pending_misses: AtomicU64,
    extraction_failures: AtomicU64,
    markers_accepted: AtomicU64,
    markers_rejected: AtomicU64,
    markers_unverified: AtomicU64,
    products_matched: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub greeting: u64,
    pub relevant: u64,
    pub inappropriate: u64,
    pub not_relevant: u64,
    pub failed_requests: u64,
    pub stream_errors: u64,
    pub format_violations: u64,
    pub citation_requests: u64,
    pub pending_misses: u64,
    pub extraction_failures: u64,
    pub markers_accepted: u64,
    pub markers_rejected: u64,
    pub markers_unverified: u64,
    pub products_matched: u64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl PipelineStats {
    pub fn request(&self) {
        bump(&self.requests, 1);
    }

    pub fn label(&self, label: RelevanceLabel) {
        let counter = match label {
            RelevanceLabel::Greeting => &self.greeting,
            RelevanceLabel::Relevant => &self.relevant,
            RelevanceLabel::Inappropriate => &self.inappropriate,
            RelevanceLabel::NotRelevant => &self.not_relevant,
        };
        bump(counter, 1);
    }

    pub fn failed_request(&self) {
        bump(&self.failed_requests, 1);
    }

    pub fn stream_error(&self) {
        bump(&self.stream_errors, 1);
    }

    pub fn format_violation(&self) {
        bump(&self.format_violations, 1);
    }

    pub fn citation_request(&self) {
        bump(&self.citation_requests, 1);
    }

    pub fn pending_miss(&self) {
        bump(&self.pending_misses, 1);
    }

    pub fn extraction_failure(&self) {
        bump(&self.extraction_failures, 1);
    }

    pub fn markers(&self, report: &MarkerReport) {
        bump(&self.markers_accepted, report.accepted as u64);
        bump(&self.markers_rejected, report.rejected as u64);
        bump(&self.markers_unverified, report.unverified as u64);
    }

    pub fn products(&self, count: usize) {
        bump(&self.products_matched, count as u64);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            requests: get(&self.requests),
            greeting: get(&self.greeting),
            relevant: get(&self.relevant),
            inappropriate: get(&self.inappropriate),
            not_relevant: get(&self.not_relevant),
            failed_requests: get(&self.failed_requests),
            stream_errors: get(&self.stream_errors),
            format_violations: get(&self.format_violations),
            citation_requests: get(&self.citation_requests),
            pending_misses: get(&self.pending_misses),
            extraction_failures: get(&self.extraction_failures),
            markers_accepted: get(&self.markers_accepted),
            markers_rejected: get(&self.markers_rejected),
            markers_unverified: get(&self.markers_unverified),
            products_matched: get(&self.products_matched),
        }
    }
}
