//! Run orchestration: the pipeline driver, the durable step ledger, and
//! the run report.
//!
//! The ledger is the crash-resilience mechanism: every external effect
//! (task creation, extension, rejection) and every completed batch result
//! is recorded under a deterministic step key before the pipeline moves
//! on. Restarting a run with the same ledger replays recorded outcomes
//! instead of re-invoking effects, so an interrupted run never double-pays
//! or double-publishes.

pub mod ledger;
#[cfg(feature = "sqlite-ledger")]
pub mod ledger_sqlite;
pub mod pipeline;
pub mod report;

pub use ledger::{InMemoryLedger, LedgerError, StepError, StepKey, StepLedger, StepRunner};
#[cfg(feature = "sqlite-ledger")]
pub use ledger_sqlite::SqliteLedger;
pub use pipeline::{Pipeline, PipelineBuilder, PipelineError};
pub use report::{
    ParagraphFailure, ParagraphResult, RunLog, RunReport, StageReport, TimingSummary,
};
