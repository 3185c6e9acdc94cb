//! Redundant-batch collection with buffering, timeout, and top-up.
//!
//! Crowd workers accept tasks and then sometimes walk away, so every
//! batch is published with buffer assignments beyond the redundancy the
//! stage actually needs. The collector waits a bounded first phase for
//! the desired count, settles for anything at or above the stage's
//! minimum-worker floor when time runs out, and extends the task and
//! keeps waiting when even the floor is unmet. Completed batches are
//! recorded in the step ledger, so a resumed run replays the batch
//! instead of re-polling the market.

use std::sync::Arc;
use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::instrument;

use crate::config::{PipelineConfig, StageConfig};
use crate::events::{Event, EventSender};
use crate::market::{Assignment, MarketError, TaskId, TaskMarket, TaskSpec};
use crate::runtime::ledger::{StepError, StepKey, StepRunner};
use crate::types::Stage;

/// How many workers a batch wants, will settle for, and over-publishes by.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct QuorumSpec {
    /// Number of responses the stage wants.
    pub desired_redundancy: usize,
    /// Extra assignments published per buffer unit.
    pub buffer_redundancy: usize,
    /// Floor below which the collector never settles.
    pub minimum_workers: usize,
    /// Bounded first-phase wait.
    pub timeout: Duration,
    /// When false the first phase waits for the full desired count.
    pub time_bounded: bool,
    /// Buffer multiplier. Find batches burn through workers faster than
    /// the other stages and use a factor of 2.
    pub buffer_factor: usize,
}

impl QuorumSpec {
    pub fn for_stage(stage: Stage, stage_cfg: &StageConfig, pipeline: &PipelineConfig) -> Self {
        let buffer_factor = if stage == Stage::Find { 2 } else { 1 };
        Self {
            desired_redundancy: stage_cfg.redundancy,
            buffer_redundancy: pipeline.buffer_redundancy,
            minimum_workers: stage_cfg.minimum_workers.min(stage_cfg.redundancy),
            timeout: pipeline.wait_time(),
            time_bounded: pipeline.time_bounded,
            buffer_factor,
        }
    }

    /// Assignments to publish: desired plus the buffered surplus.
    pub fn published_assignments(&self) -> usize {
        self.desired_redundancy + self.buffer_factor * self.buffer_redundancy
    }
}

/// The recorded outcome of one batch wait.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletedBatch {
    pub task_id: TaskId,
    /// Accepted assignments, truncated to the desired redundancy.
    pub assignments: Vec<Assignment>,
    /// How many submissions existed when the batch was accepted.
    pub total_available: usize,
    pub wait_millis: u64,
    /// Number of extension rounds the batch needed.
    pub extensions: u32,
}

#[derive(Debug, Error, Diagnostic)]
pub enum QuorumError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Market(#[from] MarketError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Step(#[from] StepError),

    #[error("batch wait aborted")]
    #[diagnostic(code(shortn::quorum::aborted))]
    Aborted,
}

/// Collects one redundant batch per step key.
pub struct QuorumCollector {
    market: Arc<dyn TaskMarket>,
    steps: Arc<StepRunner>,
    events: EventSender,
    poll_interval: Duration,
    abort: Option<watch::Receiver<bool>>,
}

impl QuorumCollector {
    pub fn new(market: Arc<dyn TaskMarket>, steps: Arc<StepRunner>, events: EventSender) -> Self {
        Self {
            market,
            steps,
            events,
            poll_interval: Duration::from_secs(5),
            abort: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Install an abort signal; flipping it to `true` fails in-flight
    /// unbounded waits with [`QuorumError::Aborted`].
    pub fn with_abort(mut self, abort: watch::Receiver<bool>) -> Self {
        self.abort = Some(abort);
        self
    }

    /// Publish `task` and wait for a quorum under `key`.
    ///
    /// The finished batch is recorded under `{key}/batch`; calling again
    /// with the same key replays it without touching the market.
    #[instrument(skip(self, task, spec), fields(step = %key))]
    pub async fn collect(
        &self,
        key: &StepKey,
        task: TaskSpec,
        spec: &QuorumSpec,
    ) -> Result<CompletedBatch, QuorumError> {
        let batch_key = key.action("batch");
        if let Some(batch) = self.steps.recorded::<CompletedBatch>(&batch_key).await? {
            tracing::debug!(task_id = %batch.task_id, "replaying recorded batch");
            return Ok(batch);
        }

        let task_id = self
            .create_task(key, task, spec.published_assignments())
            .await?;

        let started = Instant::now();
        let mut extensions = 0u32;

        // Bounded first phase: wait for the full desired count.
        let mut status = self
            .wait_for(
                key,
                &task_id,
                spec.desired_redundancy,
                spec.time_bounded.then_some(spec.timeout),
            )
            .await?;

        // If the deadline passed short of the floor, extend and wait
        // unboundedly; the floor is non-negotiable.
        while status.len() < spec.minimum_workers {
            extensions += 1;
            self.extend_task(
                key,
                &task_id,
                spec.buffer_redundancy.max(1),
                format!("extend#{extensions}"),
            )
            .await?;
            status = self
                .wait_for(key, &task_id, spec.minimum_workers, None)
                .await?;
        }

        let batch = self
            .finish(
                &batch_key,
                task_id,
                status,
                spec.desired_redundancy,
                started,
                extensions,
            )
            .await?;
        Ok(batch)
    }

    /// Extend an already-collected batch because the stage found nothing
    /// usable in it, and wait for strictly more submissions.
    ///
    /// `round` distinguishes successive top-ups of the same step.
    #[instrument(skip(self, previous, spec), fields(step = %key, round))]
    pub async fn top_up(
        &self,
        key: &StepKey,
        previous: &CompletedBatch,
        spec: &QuorumSpec,
        round: u32,
    ) -> Result<CompletedBatch, QuorumError> {
        let batch_key = key.action(format!("batch#{round}"));
        if let Some(batch) = self.steps.recorded::<CompletedBatch>(&batch_key).await? {
            return Ok(batch);
        }

        // Top-up extensions live in their own action namespace.
        self.extend_task(
            key,
            &previous.task_id,
            spec.desired_redundancy.max(1),
            format!("topup-extend#{round}"),
        )
        .await?;

        let started = Instant::now();
        let wanted = previous.total_available + 1;
        let status = self.wait_for(key, &previous.task_id, wanted, None).await?;
        let desired = previous.total_available + spec.desired_redundancy;
        self.finish(
            &batch_key,
            previous.task_id.clone(),
            status,
            desired,
            started,
            previous.extensions + 1,
        )
        .await
    }

    async fn create_task(
        &self,
        key: &StepKey,
        mut task: TaskSpec,
        assignments: usize,
    ) -> Result<TaskId, QuorumError> {
        task.assignment_count = assignments;
        let market = Arc::clone(&self.market);
        let id = self
            .steps
            .execute(&key.action("create"), move || {
                let market = Arc::clone(&market);
                let task = task.clone();
                Box::pin(async move { market.create_task(&task).await.map_err(|e| e.to_string()) })
            })
            .await?;
        Ok(id)
    }

    async fn extend_task(
        &self,
        key: &StepKey,
        task_id: &TaskId,
        additional: usize,
        action: String,
    ) -> Result<(), QuorumError> {
        let market = Arc::clone(&self.market);
        let task_id = task_id.clone();
        self.steps
            .execute::<(), _>(&key.action(action), move || {
                let market = Arc::clone(&market);
                let task_id = task_id.clone();
                Box::pin(async move {
                    market
                        .extend(&task_id, additional)
                        .await
                        .map_err(|e| e.to_string())
                })
            })
            .await?;
        Ok(())
    }

    /// Poll until `wanted` submissions exist or the deadline passes.
    /// Returns whatever was available last.
    async fn wait_for(
        &self,
        key: &StepKey,
        task_id: &TaskId,
        wanted: usize,
        deadline: Option<Duration>,
    ) -> Result<Vec<Assignment>, QuorumError> {
        let started = Instant::now();
        let mut last_seen = usize::MAX;
        loop {
            let status = self.market.status(task_id).await?;
            let available = status.assignments.len();
            if available != last_seen {
                last_seen = available;
                self.events.emit(Event::BatchStatus {
                    paragraph: key.paragraph,
                    patch: key.patch,
                    stage: key.stage,
                    completed: available,
                    needed: wanted,
                });
            }
            if available >= wanted {
                return Ok(status.assignments);
            }
            if let Some(limit) = deadline {
                if started.elapsed() >= limit {
                    return Ok(status.assignments);
                }
            }
            self.sleep_or_abort().await?;
        }
    }

    async fn sleep_or_abort(&self) -> Result<(), QuorumError> {
        let Some(mut abort) = self.abort.clone() else {
            tokio::time::sleep(self.poll_interval).await;
            return Ok(());
        };
        if *abort.borrow() {
            return Err(QuorumError::Aborted);
        }
        let sleep = tokio::time::sleep(self.poll_interval);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Ok(()),
                changed = abort.changed() => match changed {
                    Ok(()) if *abort.borrow() => return Err(QuorumError::Aborted),
                    Ok(()) => {}
                    // Sender gone: no abort can ever arrive, so finish the
                    // interval instead of re-polling immediately.
                    Err(_) => {
                        sleep.as_mut().await;
                        return Ok(());
                    }
                },
            }
        }
    }

    async fn finish(
        &self,
        batch_key: &StepKey,
        task_id: TaskId,
        mut assignments: Vec<Assignment>,
        desired: usize,
        started: Instant,
        extensions: u32,
    ) -> Result<CompletedBatch, QuorumError> {
        let total_available = assignments.len();
        assignments.truncate(desired);
        let batch = CompletedBatch {
            task_id,
            assignments,
            total_available,
            wait_millis: started.elapsed().as_millis() as u64,
            extensions,
        };
        let recorded = self
            .steps
            .execute(batch_key, move || {
                let batch = batch.clone();
                Box::pin(async move { Ok::<_, String>(batch) })
            })
            .await?;
        Ok(recorded)
    }
}
