//! The Find-Fix-Verify pipeline driver.
//!
//! One [`Pipeline`] processes every paragraph of a document: Find yields
//! candidate patches, each patch runs Fix and Verify concurrently with
//! its siblings, overlapping results merge, and the paragraph's final
//! patch list is recorded in the step ledger and compiled into a length
//! plan. A paragraph whose steps keep failing is suspended and reported;
//! the rest of the run continues, and rerunning with the same ledger
//! resumes exactly the suspended work.

use std::sync::Arc;

use futures_util::future::join_all;
use miette::Diagnostic;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;
use crate::document::{DocumentError, DocumentSource, NullPageHost, TaskPageHost};
use crate::events::{Event, EventSender};
use crate::market::TaskMarket;
use crate::merge::merge_overlapping;
use crate::patch::Patch;
use crate::quorum::QuorumCollector;
use crate::report::{OutputWriters, ReportError};
use crate::runtime::ledger::{InMemoryLedger, StepError, StepKey, StepLedger, StepRunner};
use crate::runtime::report::{ParagraphFailure, ParagraphResult, RunLog, RunReport};
use crate::selection::LengthPlan;
use crate::stages::{run_find, run_fix, run_verify, StageContext, StageError};
use crate::types::Stage;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Output(#[from] ReportError),
}

/// Builder for [`Pipeline`]; only the market and document are required.
pub struct PipelineBuilder {
    market: Arc<dyn TaskMarket>,
    document: Arc<dyn DocumentSource>,
    pages: Arc<dyn TaskPageHost>,
    ledger: Arc<dyn StepLedger>,
    config: PipelineConfig,
    events: EventSender,
    abort: Option<tokio::sync::watch::Receiver<bool>>,
}

impl PipelineBuilder {
    pub fn new(market: Arc<dyn TaskMarket>, document: Arc<dyn DocumentSource>) -> Self {
        Self {
            market,
            document,
            pages: Arc::new(NullPageHost),
            ledger: Arc::new(InMemoryLedger::new()),
            config: PipelineConfig::default(),
            events: EventSender::disconnected(),
            abort: None,
        }
    }

    pub fn with_pages(mut self, pages: Arc<dyn TaskPageHost>) -> Self {
        self.pages = pages;
        self
    }

    /// Use a durable ledger so a crashed run can resume.
    pub fn with_ledger(mut self, ledger: Arc<dyn StepLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    /// Operator-level abort for unbounded quorum waits.
    pub fn with_abort(mut self, abort: tokio::sync::watch::Receiver<bool>) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn build(self) -> Pipeline {
        let steps = Arc::new(StepRunner::new(Arc::clone(&self.ledger)));
        let mut collector = QuorumCollector::new(
            Arc::clone(&self.market),
            Arc::clone(&steps),
            self.events.clone(),
        )
        .with_poll_interval(self.config.poll_interval());
        if let Some(abort) = self.abort {
            collector = collector.with_abort(abort);
        }
        let log = Arc::new(RunLog::new());
        let ctx = StageContext {
            market: self.market,
            pages: self.pages,
            collector,
            steps: Arc::clone(&steps),
            config: self.config.clone(),
            events: self.events,
            log: Arc::clone(&log),
        };
        Pipeline {
            ctx,
            document: self.document,
            steps,
            log,
            config: self.config,
        }
    }
}

pub struct Pipeline {
    ctx: StageContext,
    document: Arc<dyn DocumentSource>,
    steps: Arc<StepRunner>,
    log: Arc<RunLog>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn builder(market: Arc<dyn TaskMarket>, document: Arc<dyn DocumentSource>) -> PipelineBuilder {
        PipelineBuilder::new(market, document)
    }

    /// Process every paragraph and assemble the run report.
    ///
    /// Paragraph failures never abort the run; they are collected as
    /// suspensions and retried by the next run over the same ledger.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let count = self.document.paragraph_count().await?;
        info!(paragraphs = count, "starting run");

        let outcomes = join_all((0..count).map(|p| self.process_paragraph(p))).await;

        let mut paragraphs = Vec::new();
        let mut suspended = Vec::new();
        for (p, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(result) => paragraphs.push(result),
                Err(e) => {
                    warn!(paragraph = p, error = %e, "paragraph suspended");
                    suspended.push(ParagraphFailure {
                        paragraph: p,
                        message: e.to_string(),
                    });
                }
            }
        }

        let report = RunReport {
            paragraphs,
            suspended,
            rejected_workers: self.log.rejections(),
            stage_reports: self.log.stage_reports(),
            timing: self.log.timing_summary(),
        };
        if self.config.file_output {
            let writers = OutputWriters::new(&self.config.output_dir)?;
            writers.write(&report)?;
        }
        Ok(report)
    }

    async fn process_paragraph(&self, index: usize) -> Result<ParagraphResult, StageError> {
        let emit_key = StepKey::new(index, None, Stage::Emit, "patches");
        if let Some(patches) = self.steps.recorded::<Vec<Patch>>(&emit_key).await? {
            info!(paragraph = index, "paragraph already recorded; skipping");
            return Ok(result_for(index, patches));
        }

        let text = self.document.paragraph_text(index).await?;
        let found = run_find(&self.ctx, index, &text).await?;

        let verified = join_all(found.into_iter().enumerate().map(|(i, patch)| {
            let text = text.clone();
            async move {
                let fixed = run_fix(&self.ctx, patch, i, &text).await?;
                run_verify(&self.ctx, fixed, i, &text).await
            }
        }))
        .await;

        let mut kept = Vec::new();
        for outcome in verified {
            if let Some(patch) = outcome? {
                kept.push(patch);
            }
        }
        let merged = merge_overlapping(kept, &text);

        let recorded: Vec<Patch> = self
            .steps
            .execute(&emit_key, move || {
                let merged = merged.clone();
                Box::pin(async move { Ok::<_, String>(merged) })
            })
            .await?;

        self.ctx.events.emit(Event::ParagraphComplete {
            paragraph: index,
            patches: recorded.len(),
        });
        Ok(result_for(index, recorded))
    }
}

fn result_for(index: usize, patches: Vec<Patch>) -> ParagraphResult {
    let plan = LengthPlan::new(&patches);
    ParagraphResult {
        paragraph: index,
        patches,
        plan,
    }
}
