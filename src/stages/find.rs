//! Find stage: ask workers to mark cuttable regions, then aggregate
//! their spans into agreed patches.

use rustc_hash::FxHashMap;
use tracing::{info, instrument, warn};

use crate::aggregate::{aggregate_spans, validate_spans, SpanRejection};
use crate::market::{AnswerForm, Assignment};
use crate::patch::{Patch, Span, SpanSuggestion};
use crate::quorum::{CompletedBatch, QuorumSpec};
use crate::types::Stage;
use crate::util::char_len;

use super::{stage_key, StageContext, StageError};

const FIND_TITLE: &str = "Find areas that can be shortened";
const FIND_DESCRIPTION: &str =
    "Highlight at least one area of the paragraph that could be written more concisely.";
const WRONG_FORM_REASON: &str = "Your submission did not include any highlighted areas.";

/// Run the Find stage for one paragraph.
///
/// Returns the agreed patches, possibly none: when aggregation keeps
/// coming up empty the batch is topped up and re-aggregated until the
/// extension-round ceiling, after which the paragraph is treated as
/// having nothing to cut.
#[instrument(skip(ctx, paragraph), fields(paragraph = paragraph_index))]
pub async fn run_find(
    ctx: &StageContext,
    paragraph_index: usize,
    paragraph: &str,
) -> Result<Vec<Patch>, StageError> {
    let key = stage_key(paragraph_index, None, Stage::Find);
    let spec = QuorumSpec::for_stage(Stage::Find, &ctx.config.find, &ctx.config);

    let mut subs = FxHashMap::default();
    subs.insert("paragraph".to_string(), paragraph.to_string());
    let page_url = ctx.pages.render("find", &subs).await?;
    let task = ctx.task_spec(FIND_TITLE, FIND_DESCRIPTION, page_url, ctx.config.find.reward);

    let mut batch = ctx.collector.collect(&key, task, &spec).await?;
    let mut parsed = parse_batch(&batch, paragraph);
    let mut patches = aggregate_spans(
        &parsed.accepted,
        parsed.num_workers,
        ctx.config.find.minimum_agreement,
        paragraph_index,
        paragraph,
    );

    let mut round = 0u32;
    while patches.is_empty() && round < ctx.config.max_extension_rounds {
        round += 1;
        warn!(round, "no agreed patches; extending find batch");
        batch = ctx.collector.top_up(&key, &batch, &spec, round).await?;
        parsed = parse_batch(&batch, paragraph);
        patches = aggregate_spans(
            &parsed.accepted,
            parsed.num_workers,
            ctx.config.find.minimum_agreement,
            paragraph_index,
            paragraph,
        );
    }

    for (assignment, reason) in &parsed.rejections {
        ctx.reject(&key, assignment, reason).await?;
    }
    ctx.finish_stage(&key, &batch, ctx.config.find.reward);
    info!(patches = patches.len(), rounds = round, "find stage complete");
    Ok(patches)
}

struct ParsedFindBatch {
    accepted: Vec<SpanSuggestion>,
    /// Workers whose span-form answers arrived, valid or not.
    num_workers: usize,
    rejections: Vec<(Assignment, String)>,
}

fn parse_batch(batch: &CompletedBatch, paragraph: &str) -> ParsedFindBatch {
    let len = char_len(paragraph);
    let mut suggestions = Vec::new();
    let mut by_worker: FxHashMap<String, &Assignment> = FxHashMap::default();
    let mut rejections: Vec<(Assignment, String)> = Vec::new();
    let mut num_workers = 0usize;

    for assignment in &batch.assignments {
        match &assignment.answer {
            AnswerForm::Spans { spans } => {
                num_workers += 1;
                by_worker.insert(assignment.worker.clone(), assignment);
                for span in spans {
                    suggestions.push(SpanSuggestion {
                        worker: assignment.worker.clone(),
                        span: Span::new(span.start.min(len), span.end.min(len)),
                    });
                }
            }
            _ => rejections.push((assignment.clone(), WRONG_FORM_REASON.to_string())),
        }
    }

    let (accepted, rejected) = validate_spans(suggestions, len);
    // One rejection per assignment even when several spans were bad.
    let mut flagged: FxHashMap<String, (Assignment, SpanRejection)> = FxHashMap::default();
    for (suggestion, why) in rejected {
        if let Some(assignment) = by_worker.get(&suggestion.worker) {
            flagged
                .entry(assignment.id.clone())
                .or_insert(((*assignment).clone(), why));
        }
    }
    rejections.extend(
        flagged
            .into_values()
            .map(|(assignment, why)| (assignment, why.reason().to_string())),
    );

    ParsedFindBatch {
        accepted,
        num_workers,
        rejections,
    }
}
