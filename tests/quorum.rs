//! Quorum collection against scripted and synthetic markets.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use shortn::events::EventSender;
use shortn::market::{
    AnswerForm, Assignment, MarketError, ScriptedMarket, TaskId, TaskMarket, TaskSpec, TaskStatus,
};
use shortn::patch::Span;
use shortn::quorum::{QuorumCollector, QuorumError, QuorumSpec};
use shortn::runtime::{InMemoryLedger, StepKey, StepRunner};
use shortn::types::Stage;

fn span_answer(start: usize, end: usize) -> AnswerForm {
    AnswerForm::Spans {
        spans: vec![Span::new(start, end)],
    }
}

fn task() -> TaskSpec {
    TaskSpec {
        title: "t".into(),
        description: "d".into(),
        page_url: "mem://pages/test".into(),
        assignment_count: 0,
        reward: 0.01,
        approval_delay: Duration::from_secs(60),
        duration: Duration::from_secs(60),
        excluded_workers: Vec::new(),
    }
}

fn spec(desired: usize, buffer: usize, minimum: usize, timeout_ms: u64) -> QuorumSpec {
    QuorumSpec {
        desired_redundancy: desired,
        buffer_redundancy: buffer,
        minimum_workers: minimum,
        timeout: Duration::from_millis(timeout_ms),
        time_bounded: true,
        buffer_factor: 1,
    }
}

fn collector(market: Arc<dyn TaskMarket>, steps: Arc<StepRunner>) -> QuorumCollector {
    QuorumCollector::new(market, steps, EventSender::disconnected())
        .with_poll_interval(Duration::from_millis(5))
}

fn scripted(answers: usize) -> ScriptedMarket {
    let market = ScriptedMarket::new();
    market.script_task(
        (0..answers)
            .map(|i| (format!("w{i}"), span_answer(0, 5)))
            .collect(),
    );
    market
}

#[tokio::test]
async fn satisfied_batches_truncate_to_desired() {
    let market = Arc::new(scripted(5));
    let steps = Arc::new(StepRunner::new(Arc::new(InMemoryLedger::new())));
    let c = collector(market.clone(), steps);

    let key = StepKey::new(0, None, Stage::Find, "task");
    let batch = c.collect(&key, task(), &spec(3, 1, 2, 1_000)).await.unwrap();

    assert_eq!(batch.assignments.len(), 3);
    assert_eq!(batch.total_available, 4); // desired 3 + buffer 1 published
    assert_eq!(batch.extensions, 0);
    assert_eq!(market.created_tasks(), 1);
}

#[tokio::test]
async fn recorded_batches_replay_without_market_calls() {
    let market = Arc::new(scripted(5));
    let steps = Arc::new(StepRunner::new(Arc::new(InMemoryLedger::new())));
    let c = collector(market.clone(), steps);

    let key = StepKey::new(0, None, Stage::Find, "task");
    let quorum = spec(3, 1, 2, 1_000);
    let first = c.collect(&key, task(), &quorum).await.unwrap();
    let second = c.collect(&key, task(), &quorum).await.unwrap();

    assert_eq!(first.task_id, second.task_id);
    assert_eq!(first.assignments, second.assignments);
    assert_eq!(market.created_tasks(), 1);
}

#[tokio::test]
async fn timeout_accepts_anything_at_or_above_the_floor() {
    // Only two of the four published assignments ever arrive.
    let market = Arc::new(scripted(2));
    let steps = Arc::new(StepRunner::new(Arc::new(InMemoryLedger::new())));
    let c = collector(market.clone(), steps);

    let key = StepKey::new(1, None, Stage::Fix, "task");
    let batch = c.collect(&key, task(), &spec(4, 0, 2, 30)).await.unwrap();

    assert_eq!(batch.assignments.len(), 2);
    assert_eq!(batch.extensions, 0);
}

#[tokio::test]
async fn top_up_waits_for_strictly_more_submissions() {
    let market = Arc::new(scripted(4));
    let steps = Arc::new(StepRunner::new(Arc::new(InMemoryLedger::new())));
    let c = collector(market.clone(), steps);

    let key = StepKey::new(0, None, Stage::Find, "task");
    let quorum = spec(2, 0, 2, 1_000);
    let batch = c.collect(&key, task(), &quorum).await.unwrap();
    assert_eq!(batch.total_available, 2);

    let topped = c.top_up(&key, &batch, &quorum, 1).await.unwrap();
    assert!(topped.total_available > batch.total_available);
    assert_eq!(topped.task_id, batch.task_id);
    assert_eq!(market.extensions(), 1);

    // Replaying the same round is free.
    let again = c.top_up(&key, &batch, &quorum, 1).await.unwrap();
    assert_eq!(again.total_available, topped.total_available);
    assert_eq!(market.extensions(), 1);
}

/// Market where submissions only arrive after the task is extended.
#[derive(Debug, Default)]
struct StragglerMarket {
    state: Mutex<StragglerState>,
}

#[derive(Debug, Default)]
struct StragglerState {
    available: usize,
    extends: usize,
}

#[async_trait]
impl TaskMarket for StragglerMarket {
    async fn create_task(&self, _spec: &TaskSpec) -> Result<TaskId, MarketError> {
        self.state.lock().available = 1;
        Ok("task-1".to_string())
    }

    async fn status(&self, _task_id: &TaskId) -> Result<TaskStatus, MarketError> {
        let state = self.state.lock();
        let assignments = (0..state.available)
            .map(|i| Assignment {
                id: format!("a{i}"),
                worker: format!("w{i}"),
                answer: span_answer(0, 3),
                submitted_at: chrono::Utc::now(),
            })
            .collect();
        Ok(TaskStatus { assignments })
    }

    async fn extend(&self, _task_id: &TaskId, _extra: usize) -> Result<(), MarketError> {
        let mut state = self.state.lock();
        state.extends += 1;
        state.available = 3;
        Ok(())
    }

    async fn reject_assignment(&self, _a: &Assignment, _r: &str) -> Result<(), MarketError> {
        Ok(())
    }
}

/// Market with a fixed submission count that counts `status` calls.
#[derive(Debug)]
struct StalledMarket {
    available: usize,
    status_calls: Mutex<usize>,
}

impl StalledMarket {
    fn new(available: usize) -> Self {
        Self {
            available,
            status_calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl TaskMarket for StalledMarket {
    async fn create_task(&self, _spec: &TaskSpec) -> Result<TaskId, MarketError> {
        Ok("task-1".to_string())
    }

    async fn status(&self, _task_id: &TaskId) -> Result<TaskStatus, MarketError> {
        *self.status_calls.lock() += 1;
        let assignments = (0..self.available)
            .map(|i| Assignment {
                id: format!("a{i}"),
                worker: format!("w{i}"),
                answer: span_answer(0, 3),
                submitted_at: chrono::Utc::now(),
            })
            .collect();
        Ok(TaskStatus { assignments })
    }

    async fn extend(&self, _task_id: &TaskId, _extra: usize) -> Result<(), MarketError> {
        Ok(())
    }

    async fn reject_assignment(&self, _a: &Assignment, _r: &str) -> Result<(), MarketError> {
        Ok(())
    }
}

#[tokio::test]
async fn dropped_abort_sender_still_honors_the_poll_interval() {
    let market = Arc::new(StalledMarket::new(2));
    let steps = Arc::new(StepRunner::new(Arc::new(InMemoryLedger::new())));
    let (tx, rx) = tokio::sync::watch::channel(false);
    drop(tx);
    let c = collector(market.clone(), steps).with_abort(rx);

    // Two submissions never grow to the desired four, so the whole 100ms
    // window is spent polling at the 5ms interval.
    let key = StepKey::new(0, None, Stage::Find, "task");
    let batch = c.collect(&key, task(), &spec(4, 0, 2, 100)).await.unwrap();

    assert_eq!(batch.assignments.len(), 2);
    let polls = *market.status_calls.lock();
    assert!(polls >= 2, "expected repeated polling, saw {polls}");
    assert!(polls < 60, "market was polled {polls} times in 100ms");
}

#[tokio::test]
async fn firing_the_abort_signal_fails_the_wait() {
    let market = Arc::new(StalledMarket::new(0));
    let steps = Arc::new(StepRunner::new(Arc::new(InMemoryLedger::new())));
    let (tx, rx) = tokio::sync::watch::channel(false);
    let c = collector(market, steps).with_abort(rx);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = tx.send(true);
    });

    let key = StepKey::new(0, None, Stage::Find, "task");
    let err = c
        .collect(&key, task(), &spec(3, 0, 2, 10_000))
        .await
        .unwrap_err();
    assert!(matches!(err, QuorumError::Aborted));
}

#[tokio::test]
async fn shortfall_extends_until_the_floor_is_met() {
    let market = Arc::new(StragglerMarket::default());
    let steps = Arc::new(StepRunner::new(Arc::new(InMemoryLedger::new())));
    let c = collector(market.clone(), steps);

    let key = StepKey::new(2, None, Stage::Verify, "task");
    let batch = c.collect(&key, task(), &spec(3, 2, 2, 30)).await.unwrap();

    assert_eq!(batch.extensions, 1);
    assert_eq!(batch.assignments.len(), 3);
    assert!(batch.assignments.len() >= 2);
    assert_eq!(market.state.lock().extends, 1);
}
