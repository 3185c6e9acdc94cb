//! Run-level accounting: per-stage timing and cost rows, rejected
//! workers, and the final report handed back to the caller.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::patch::{Patch, WorkerId};
use crate::selection::LengthPlan;
use crate::types::Stage;

/// One completed stage's cost and wait, the unit of the CSV outputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub paragraph: usize,
    pub patch: Option<usize>,
    pub stage: Stage,
    pub wait_millis: u64,
    pub cost: f64,
}

/// A worker whose submission was rejected, kept for operator review.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedWorker {
    pub worker: WorkerId,
    pub stage: Stage,
    pub reason: String,
}

/// A paragraph that could not be completed in this run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParagraphFailure {
    pub paragraph: usize,
    pub message: String,
}

/// A fully processed paragraph: its final patch list and length plan.
#[derive(Clone, Debug)]
pub struct ParagraphResult {
    pub paragraph: usize,
    pub patches: Vec<Patch>,
    pub plan: LengthPlan,
}

/// Aggregate wait statistics across completed paragraphs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    /// (paragraph, total wait millis) with the smallest total.
    pub fastest: Option<(usize, u64)>,
    /// (paragraph, total wait millis) with the largest total.
    pub slowest: Option<(usize, u64)>,
    pub total_wait_millis: u64,
    pub total_cost: f64,
}

#[derive(Debug, Default)]
struct LogState {
    stages: Vec<StageReport>,
    rejections: Vec<RejectedWorker>,
}

/// Append-only accumulator shared by concurrently running stages.
#[derive(Debug, Default)]
pub struct RunLog {
    state: Mutex<LogState>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_stage(&self, report: StageReport) {
        self.state.lock().stages.push(report);
    }

    pub fn record_rejection(&self, worker: WorkerId, stage: Stage, reason: impl Into<String>) {
        self.state.lock().rejections.push(RejectedWorker {
            worker,
            stage,
            reason: reason.into(),
        });
    }

    pub fn stage_reports(&self) -> Vec<StageReport> {
        self.state.lock().stages.clone()
    }

    pub fn rejections(&self) -> Vec<RejectedWorker> {
        self.state.lock().rejections.clone()
    }

    /// Per-paragraph wait totals folded into a summary.
    pub fn timing_summary(&self) -> TimingSummary {
        let state = self.state.lock();
        let mut per_paragraph: Vec<(usize, u64)> = Vec::new();
        let mut total_wait = 0u64;
        let mut total_cost = 0f64;
        for report in &state.stages {
            total_wait += report.wait_millis;
            total_cost += report.cost;
            match per_paragraph.iter_mut().find(|(p, _)| *p == report.paragraph) {
                Some((_, wait)) => *wait += report.wait_millis,
                None => per_paragraph.push((report.paragraph, report.wait_millis)),
            }
        }
        TimingSummary {
            fastest: per_paragraph.iter().copied().min_by_key(|(_, w)| *w),
            slowest: per_paragraph.iter().copied().max_by_key(|(_, w)| *w),
            total_wait_millis: total_wait,
            total_cost,
        }
    }
}

/// Everything a finished run reports back.
#[derive(Debug)]
pub struct RunReport {
    /// Paragraphs that completed end to end, in document order.
    pub paragraphs: Vec<ParagraphResult>,
    /// Paragraphs suspended by a fatal step; resumable with the same ledger.
    pub suspended: Vec<ParagraphFailure>,
    pub rejected_workers: Vec<RejectedWorker>,
    pub stage_reports: Vec<StageReport>,
    pub timing: TimingSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_summary_folds_per_paragraph() {
        let log = RunLog::new();
        log.record_stage(StageReport {
            paragraph: 0,
            patch: None,
            stage: Stage::Find,
            wait_millis: 100,
            cost: 0.1,
        });
        log.record_stage(StageReport {
            paragraph: 0,
            patch: Some(0),
            stage: Stage::Fix,
            wait_millis: 50,
            cost: 0.25,
        });
        log.record_stage(StageReport {
            paragraph: 1,
            patch: None,
            stage: Stage::Find,
            wait_millis: 30,
            cost: 0.1,
        });
        let summary = log.timing_summary();
        assert_eq!(summary.fastest, Some((1, 30)));
        assert_eq!(summary.slowest, Some((0, 150)));
        assert_eq!(summary.total_wait_millis, 180);
        assert!((summary.total_cost - 0.45).abs() < 1e-9);
    }
}
