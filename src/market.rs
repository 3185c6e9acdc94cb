//! Abstract task-market collaborator.
//!
//! The pipeline never talks to a concrete crowd platform; it works against
//! the [`TaskMarket`] trait, which models the small surface the stages
//! need: publish a task, poll its assignments, add assignment slots, and
//! reject bad submissions. [`ScriptedMarket`] is an in-memory
//! implementation that replays pre-canned worker answers, used by the
//! integration tests and runnable demos.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::patch::{Span, WorkerId};

/// Identifier the market assigns to a published task.
pub type TaskId = String;

#[derive(Debug, Error, Diagnostic)]
pub enum MarketError {
    #[error("task not found: {task_id}")]
    #[diagnostic(code(shortn::market::task_not_found))]
    TaskNotFound { task_id: TaskId },

    #[error("market backend error: {message}")]
    #[diagnostic(
        code(shortn::market::backend),
        help("Backend failures are retried at the step-envelope boundary.")
    )]
    Backend { message: String },
}

/// Parameters for publishing one task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskSpec {
    pub title: String,
    pub description: String,
    /// URL of the rendered task page workers see.
    pub page_url: String,
    /// Number of independent assignments requested.
    pub assignment_count: usize,
    /// Payment per assignment, in the market's currency unit.
    pub reward: f64,
    /// Delay before unreviewed assignments auto-approve.
    pub approval_delay: Duration,
    /// Time a worker may hold an assignment before it expires.
    pub duration: Duration,
    /// Workers barred from accepting this task (e.g. the Fix workers of
    /// the patch being verified).
    pub excluded_workers: Vec<WorkerId>,
}

/// The payload a worker submitted, by stage shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerForm {
    /// Find stage: spans the worker marked as cuttable.
    Spans { spans: Vec<Span> },
    /// Fix stage: a rewrite plus the binary cuttability judgment.
    Rewrite {
        new_text: String,
        cuttable: Option<bool>,
    },
    /// Verify stage: objection ballots per category; `None` means the
    /// field was missing from the form.
    Votes {
        grammar: Option<Vec<String>>,
        meaning: Option<Vec<String>>,
    },
}

/// One worker's completed assignment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub worker: WorkerId,
    pub answer: AnswerForm,
    pub submitted_at: DateTime<Utc>,
}

/// Snapshot of a task's accumulated assignments.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskStatus {
    pub assignments: Vec<Assignment>,
}

/// Minimal task-market surface the pipeline depends on.
#[async_trait]
pub trait TaskMarket: Send + Sync {
    /// Publish a task and return its market identifier.
    async fn create_task(&self, spec: &TaskSpec) -> Result<TaskId, MarketError>;

    /// Current assignments for a task. Workers may still be in flight;
    /// callers poll until satisfied.
    async fn status(&self, task_id: &TaskId) -> Result<TaskStatus, MarketError>;

    /// Add assignment slots to an existing task.
    async fn extend(&self, task_id: &TaskId, extra_assignments: usize) -> Result<(), MarketError>;

    /// Reject one assignment with a human-readable reason.
    async fn reject_assignment(
        &self,
        assignment: &Assignment,
        reason: &str,
    ) -> Result<(), MarketError>;
}

/// A rejection recorded by [`ScriptedMarket`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRejection {
    pub assignment_id: String,
    pub worker: WorkerId,
    pub reason: String,
}

#[derive(Debug, Default)]
struct ScriptedTask {
    assignment_count: usize,
    answers: Vec<(WorkerId, AnswerForm)>,
    excluded: Vec<WorkerId>,
}

#[derive(Debug, Default)]
struct ScriptedState {
    /// Pending scripts, consumed in order of task creation.
    scripts: Vec<Vec<(WorkerId, AnswerForm)>>,
    tasks: FxHashMap<TaskId, ScriptedTask>,
    created: usize,
    extended: usize,
    rejections: Vec<RecordedRejection>,
}

/// In-memory market that replays scripted worker answers.
///
/// Each call to [`TaskMarket::create_task`] consumes the next script in
/// order. A task exposes `min(assignment_count, script length)` answers,
/// minus any worker on the task's exclusion list, so extending a task
/// releases further scripted answers just like real stragglers arriving.
#[derive(Clone, Debug, Default)]
pub struct ScriptedMarket {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedMarket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the scripted answers for the next created task.
    pub fn script_task(&self, answers: Vec<(WorkerId, AnswerForm)>) {
        self.state.lock().scripts.push(answers);
    }

    /// Number of tasks created so far.
    pub fn created_tasks(&self) -> usize {
        self.state.lock().created
    }

    /// Number of extension calls so far.
    pub fn extensions(&self) -> usize {
        self.state.lock().extended
    }

    /// Rejections recorded so far.
    pub fn rejections(&self) -> Vec<RecordedRejection> {
        self.state.lock().rejections.clone()
    }
}

#[async_trait]
impl TaskMarket for ScriptedMarket {
    async fn create_task(&self, spec: &TaskSpec) -> Result<TaskId, MarketError> {
        let mut state = self.state.lock();
        if state.scripts.is_empty() {
            return Err(MarketError::Backend {
                message: "no scripted answers queued for task creation".into(),
            });
        }
        let answers = state.scripts.remove(0);
        let task_id = Uuid::new_v4().to_string();
        state.tasks.insert(
            task_id.clone(),
            ScriptedTask {
                assignment_count: spec.assignment_count,
                answers,
                excluded: spec.excluded_workers.clone(),
            },
        );
        state.created += 1;
        Ok(task_id)
    }

    async fn status(&self, task_id: &TaskId) -> Result<TaskStatus, MarketError> {
        let state = self.state.lock();
        let task = state
            .tasks
            .get(task_id)
            .ok_or_else(|| MarketError::TaskNotFound {
                task_id: task_id.clone(),
            })?;
        let assignments = task
            .answers
            .iter()
            .filter(|(worker, _)| !task.excluded.contains(worker))
            .take(task.assignment_count)
            .enumerate()
            .map(|(i, (worker, answer))| Assignment {
                id: format!("{task_id}#{i}"),
                worker: worker.clone(),
                answer: answer.clone(),
                submitted_at: Utc::now(),
            })
            .collect();
        Ok(TaskStatus { assignments })
    }

    async fn extend(&self, task_id: &TaskId, extra_assignments: usize) -> Result<(), MarketError> {
        let mut state = self.state.lock();
        state.extended += 1;
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| MarketError::TaskNotFound {
                task_id: task_id.clone(),
            })?;
        task.assignment_count += extra_assignments;
        Ok(())
    }

    async fn reject_assignment(
        &self,
        assignment: &Assignment,
        reason: &str,
    ) -> Result<(), MarketError> {
        let mut state = self.state.lock();
        state.rejections.push(RecordedRejection {
            assignment_id: assignment.id.clone(),
            worker: assignment.worker.clone(),
            reason: reason.to_string(),
        });
        Ok(())
    }
}
