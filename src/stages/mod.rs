//! Stage drivers: Find, Fix, and Verify.
//!
//! Each driver publishes one crowd task for its unit of work, collects a
//! quorum through [`QuorumCollector`], parses and validates the answers,
//! and rejects unusable submissions through the step envelope so a
//! resumed run never double-flags a worker. Drivers share a
//! [`StageContext`] carrying the collaborators and the run log.

pub mod find;
pub mod fix;
pub mod verify;

use std::sync::Arc;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::document::{DocumentError, TaskPageHost};
use crate::events::{Event, EventSender};
use crate::market::{Assignment, TaskMarket, TaskSpec};
use crate::quorum::{CompletedBatch, QuorumCollector, QuorumError};
use crate::runtime::ledger::{StepError, StepKey, StepRunner};
use crate::runtime::report::{RunLog, StageReport};
use crate::types::Stage;

pub use find::run_find;
pub use fix::{run_fix, FixOutcome};
pub use verify::run_verify;

#[derive(Debug, Error, Diagnostic)]
pub enum StageError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Quorum(#[from] QuorumError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Document(#[from] DocumentError),
}

/// Collaborators shared by every stage driver of one run.
pub struct StageContext {
    pub market: Arc<dyn TaskMarket>,
    pub pages: Arc<dyn TaskPageHost>,
    pub collector: QuorumCollector,
    pub steps: Arc<StepRunner>,
    pub config: PipelineConfig,
    pub events: EventSender,
    pub log: Arc<RunLog>,
}

impl StageContext {
    /// Baseline task parameters shared across stages.
    pub(crate) fn task_spec(&self, title: &str, description: &str, page_url: String, reward: f64) -> TaskSpec {
        TaskSpec {
            title: title.to_string(),
            description: description.to_string(),
            page_url,
            // Sized by the collector from the quorum spec.
            assignment_count: 0,
            reward,
            approval_delay: Duration::from_secs(60 * 60),
            duration: Duration::from_secs(30 * 60),
            excluded_workers: Vec::new(),
        }
    }

    /// Reject one assignment exactly once, logging the worker.
    pub(crate) async fn reject(
        &self,
        key: &StepKey,
        assignment: &Assignment,
        reason: &str,
    ) -> Result<(), StageError> {
        let market = Arc::clone(&self.market);
        let target = assignment.clone();
        let reason_owned = reason.to_string();
        self.steps
            .execute::<(), _>(&key.action(format!("reject#{}", assignment.id)), move || {
                let market = Arc::clone(&market);
                let target = target.clone();
                let reason = reason_owned.clone();
                Box::pin(async move {
                    market
                        .reject_assignment(&target, &reason)
                        .await
                        .map_err(|e| e.to_string())
                })
            })
            .await?;
        self.log
            .record_rejection(assignment.worker.clone(), key.stage, reason);
        self.events.emit(Event::WorkerRejected {
            worker: assignment.worker.clone(),
            stage: key.stage,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Account a finished stage: one report row plus a progress event.
    pub(crate) fn finish_stage(&self, key: &StepKey, batch: &CompletedBatch, reward: f64) {
        let cost = batch.total_available as f64 * reward;
        self.log.record_stage(StageReport {
            paragraph: key.paragraph,
            patch: key.patch,
            stage: key.stage,
            wait_millis: batch.wait_millis,
            cost,
        });
        self.events.emit(Event::StageComplete {
            paragraph: key.paragraph,
            patch: key.patch,
            stage: key.stage,
            wait_millis: batch.wait_millis,
            cost,
        });
    }
}

/// Step key for a stage's batch, e.g. `p2/patch0/verify/...`.
pub(crate) fn stage_key(paragraph: usize, patch: Option<usize>, stage: Stage) -> StepKey {
    StepKey::new(paragraph, patch, stage, "task")
}
