//! Durable step ledger and the idempotent step envelope.
//!
//! Every externally visible effect the pipeline performs is wrapped in
//! [`StepRunner::execute`]: the runner looks the step up in the ledger,
//! replays the recorded outcome if present, and otherwise runs the effect
//! once, records its serialized result, and returns it. Step keys are
//! deterministic functions of (paragraph, patch, stage, action), so a
//! resumed run converges on the same keys and skips completed work.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::Stage;

/// Deterministic identifier for one pipeline step.
///
/// Renders as `p{paragraph}[/patch{n}]/{stage}/{action}`, e.g.
/// `p3/patch1/fix/create`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StepKey {
    pub paragraph: usize,
    pub patch: Option<usize>,
    pub stage: Stage,
    pub action: String,
}

impl StepKey {
    pub fn new(
        paragraph: usize,
        patch: Option<usize>,
        stage: Stage,
        action: impl Into<String>,
    ) -> Self {
        Self {
            paragraph,
            patch,
            stage,
            action: action.into(),
        }
    }

    /// Same key with a different action, for sub-steps of one batch.
    pub fn action(&self, action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..self.clone()
        }
    }

    pub fn render(&self) -> String {
        match self.patch {
            Some(patch) => format!("p{}/patch{}/{}/{}", self.paragraph, patch, self.stage, self.action),
            None => format!("p{}/{}/{}", self.paragraph, self.stage, self.action),
        }
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum LedgerError {
    #[error("ledger backend error: {message}")]
    #[diagnostic(code(shortn::ledger::backend))]
    Backend { message: String },
}

/// Persistent store of completed step outcomes.
///
/// `record` must be first-write-wins: if the key is already present the
/// stored value is returned unchanged, so two racing writers observe one
/// outcome.
#[async_trait]
pub trait StepLedger: Send + Sync {
    async fn load(&self, key: &StepKey) -> Result<Option<Value>, LedgerError>;
    async fn record(&self, key: &StepKey, value: Value) -> Result<Value, LedgerError>;
    /// Rendered keys of every recorded step, for diagnostics.
    async fn completed_steps(&self) -> Result<Vec<String>, LedgerError>;
}

/// Ledger held in a process-local map. Resumption only works within one
/// process lifetime; use the sqlite ledger for real runs.
#[derive(Default)]
pub struct InMemoryLedger {
    steps: Mutex<FxHashMap<String, Value>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StepLedger for InMemoryLedger {
    async fn load(&self, key: &StepKey) -> Result<Option<Value>, LedgerError> {
        Ok(self.steps.lock().get(&key.render()).cloned())
    }

    async fn record(&self, key: &StepKey, value: Value) -> Result<Value, LedgerError> {
        let mut steps = self.steps.lock();
        Ok(steps.entry(key.render()).or_insert(value).clone())
    }

    async fn completed_steps(&self) -> Result<Vec<String>, LedgerError> {
        let mut keys: Vec<String> = self.steps.lock().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum StepError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Ledger(#[from] LedgerError),

    #[error("step {key} failed after {attempts} attempts: {message}")]
    #[diagnostic(
        code(shortn::step::effect_failed),
        help("the effect kept failing; the ledger holds no outcome for this key, so a resumed run will retry it")
    )]
    EffectFailed {
        key: String,
        attempts: u32,
        message: String,
    },

    #[error("step {key} outcome could not be decoded: {source}")]
    #[diagnostic(
        code(shortn::step::codec),
        help("the recorded value's shape no longer matches the step's result type; the ledger likely predates a schema change")
    )]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Executes effects exactly once per step key.
pub struct StepRunner {
    ledger: Arc<dyn StepLedger>,
    locks: Mutex<FxHashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl StepRunner {
    pub fn new(ledger: Arc<dyn StepLedger>) -> Self {
        Self {
            ledger,
            locks: Mutex::new(FxHashMap::default()),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(250),
        }
    }

    pub fn with_retries(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_backoff = backoff;
        self
    }

    pub fn ledger(&self) -> Arc<dyn StepLedger> {
        Arc::clone(&self.ledger)
    }

    /// Recorded outcome for `key`, if any, decoded as `T`.
    pub async fn recorded<T: DeserializeOwned>(&self, key: &StepKey) -> Result<Option<T>, StepError> {
        match self.ledger.load(key).await? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StepError::Codec {
                    key: key.render(),
                    source,
                }),
        }
    }

    /// Run `effect` at most once for `key`.
    ///
    /// The per-key lock serializes racing callers; whichever enters first
    /// runs the effect, and the rest replay its recorded outcome. The
    /// effect is retried with a fixed backoff up to the configured attempt
    /// bound before the step is reported failed.
    pub async fn execute<T, F>(&self, key: &StepKey, mut effect: F) -> Result<T, StepError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> BoxFuture<'static, Result<T, String>>,
    {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        if let Some(recorded) = self.recorded(key).await? {
            tracing::debug!(step = %key, "replaying recorded step");
            return Ok(recorded);
        }

        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            match effect().await {
                Ok(result) => {
                    let value =
                        serde_json::to_value(&result).map_err(|source| StepError::Codec {
                            key: key.render(),
                            source,
                        })?;
                    let stored = self.ledger.record(key, value).await?;
                    // First-write-wins: decode whatever the ledger kept.
                    return serde_json::from_value(stored).map_err(|source| StepError::Codec {
                        key: key.render(),
                        source,
                    });
                }
                Err(message) => {
                    tracing::warn!(step = %key, attempt, error = %message, "step effect failed");
                    last_error = message;
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_backoff).await;
                    }
                }
            }
        }
        Err(StepError::EffectFailed {
            key: key.render(),
            attempts: self.max_attempts,
            message: last_error,
        })
    }

    fn lock_for(&self, key: &StepKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(
            locks
                .entry(key.render())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}
