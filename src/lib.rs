//! # Shortn: crowd-powered text shortening
//!
//! Shortn runs the Find-Fix-Verify pattern over a document: for each
//! paragraph, one crowd of workers marks regions that could be tighter
//! (**Find**), another rewrites each agreed region (**Fix**), and a third
//! votes the rewrites up or down (**Verify**). Surviving rewrites become
//! per-region options, overlapping regions merge, and a subset-sum length
//! plan answers "give me this paragraph at roughly N characters" queries
//! in one lookup.
//!
//! ## Core pieces
//!
//! - [`market::TaskMarket`] abstracts the crowd platform; tests and demos
//!   use [`market::ScriptedMarket`].
//! - [`runtime::StepLedger`] records every side effect under a
//!   deterministic step key, so an interrupted run resumes instead of
//!   re-paying workers. [`runtime::SqliteLedger`] persists across
//!   processes (feature `sqlite-ledger`, on by default).
//! - [`quorum::QuorumCollector`] handles batch sizing, bounded waits, and
//!   top-ups when workers go missing.
//! - [`runtime::Pipeline`] drives the stages and produces a
//!   [`runtime::RunReport`].
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use shortn::config::PipelineConfig;
//! use shortn::document::StaticDocument;
//! use shortn::market::{AnswerForm, ScriptedMarket};
//! use shortn::patch::Span;
//! use shortn::runtime::Pipeline;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> miette::Result<()> {
//! let market = ScriptedMarket::new();
//! market.script_task(vec![
//!     ("w1".into(), AnswerForm::Spans { spans: vec![Span::new(4, 16)] }),
//!     ("w2".into(), AnswerForm::Spans { spans: vec![Span::new(6, 14)] }),
//! ]);
//! // ... one script per Fix and Verify task follows.
//!
//! let document = StaticDocument::new(vec![
//!     "The quick brown fox jumps over the lazy dog.".to_string(),
//! ]);
//! let pipeline = Pipeline::builder(Arc::new(market), Arc::new(document))
//!     .with_config(PipelineConfig::default())
//!     .build();
//! let report = pipeline.run().await.map_err(miette::Report::from)?;
//! for paragraph in &report.paragraphs {
//!     println!(
//!         "paragraph {}: lengths {:?}",
//!         paragraph.paragraph,
//!         paragraph.plan.possible_lengths()
//!     );
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module guide
//!
//! - [`aggregate`] - Find-stage span validation and interval-stabbing sweep
//! - [`diff`] / [`extract`] - character diffing and minimal-edit windows
//! - [`tally`] - Verify-stage vote counting
//! - [`merge`] - collapsing patches with overlapping edit windows
//! - [`selection`] - the length-selection dynamic program
//! - [`quorum`] - batch collection against the task market
//! - [`stages`] - the Find/Fix/Verify drivers
//! - [`runtime`] - pipeline, step ledger, and run report

pub mod aggregate;
pub mod config;
pub mod diff;
pub mod document;
pub mod events;
pub mod extract;
pub mod market;
pub mod merge;
pub mod patch;
pub mod quorum;
pub mod report;
pub mod runtime;
pub mod selection;
pub mod stages;
pub mod tally;
pub mod telemetry;
pub mod types;
pub mod util;
