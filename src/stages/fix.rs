//! Fix stage: ask workers to rewrite one patch's context window more
//! concisely, and to judge whether the marked region can simply be cut.

use rustc_hash::FxHashMap;
use tracing::{info, instrument, warn};

use crate::market::{AnswerForm, Assignment};
use crate::patch::{Patch, WorkerId};
use crate::quorum::{CompletedBatch, QuorumSpec};
use crate::tally;
use crate::types::Stage;
use crate::util::char_len;

use super::{stage_key, StageContext, StageError};

const FIX_TITLE: &str = "Shorten this text without changing its meaning";
const FIX_DESCRIPTION: &str =
    "Rewrite the highlighted text so it is shorter but keeps the same meaning.";
const COPY_PASTE_REASON: &str =
    "Your rewrite was identical to the original text; please provide a new version.";
const NOT_SHORTER_REASON: &str = "Your rewrite was not shorter than the original text.";
const WRONG_FORM_REASON: &str = "Your submission did not include a rewrite.";

/// What the Fix stage hands to Verify.
#[derive(Clone, Debug)]
pub struct FixOutcome {
    /// The patch with cuttability counters filled in.
    pub patch: Patch,
    /// Distinct usable rewrites, in submission order.
    pub rewrites: Vec<String>,
    /// Every worker who submitted a rewrite form; barred from verifying.
    pub fix_workers: Vec<WorkerId>,
}

/// Run the Fix stage for one patch.
///
/// An empty rewrite list after the extension-round ceiling is not an
/// error: the patch proceeds with only its cuttability result and the
/// unverified-patch policy decides its fate downstream.
#[instrument(skip(ctx, patch, paragraph), fields(paragraph = patch.paragraph, patch = patch_index))]
pub async fn run_fix(
    ctx: &StageContext,
    mut patch: Patch,
    patch_index: usize,
    paragraph: &str,
) -> Result<FixOutcome, StageError> {
    let key = stage_key(patch.paragraph, Some(patch_index), Stage::Fix);
    let spec = QuorumSpec::for_stage(Stage::Fix, &ctx.config.fix, &ctx.config);
    let editable = patch.context_text(paragraph);

    let mut subs = FxHashMap::default();
    subs.insert("text".to_string(), editable.clone());
    subs.insert(
        "highlight_start".to_string(),
        (patch.start - patch.context_start).to_string(),
    );
    subs.insert(
        "highlight_end".to_string(),
        (patch.end - patch.context_start).to_string(),
    );
    let page_url = ctx.pages.render("fix", &subs).await?;
    let task = ctx.task_spec(FIX_TITLE, FIX_DESCRIPTION, page_url, ctx.config.fix.reward);

    let mut batch = ctx.collector.collect(&key, task, &spec).await?;
    let mut parsed = parse_batch(&batch, &editable);

    let mut round = 0u32;
    while parsed.rewrites.is_empty() && round < ctx.config.max_extension_rounds {
        round += 1;
        warn!(round, "no usable rewrites; extending fix batch");
        batch = ctx.collector.top_up(&key, &batch, &spec, round).await?;
        parsed = parse_batch(&batch, &editable);
    }

    for (assignment, reason) in &parsed.rejections {
        ctx.reject(&key, assignment, reason).await?;
    }

    patch.num_editors = parsed.num_editors;
    patch.cut_votes = parsed.cut_votes;
    patch.can_cut = tally::can_cut(parsed.cut_votes, parsed.num_editors);

    ctx.finish_stage(&key, &batch, ctx.config.fix.reward);
    info!(
        rewrites = parsed.rewrites.len(),
        can_cut = patch.can_cut,
        "fix stage complete"
    );
    Ok(FixOutcome {
        patch,
        rewrites: parsed.rewrites,
        fix_workers: parsed.fix_workers,
    })
}

struct ParsedFixBatch {
    rewrites: Vec<String>,
    fix_workers: Vec<WorkerId>,
    num_editors: usize,
    cut_votes: usize,
    rejections: Vec<(Assignment, String)>,
}

fn parse_batch(batch: &CompletedBatch, editable: &str) -> ParsedFixBatch {
    let editable_len = char_len(editable);
    let mut rewrites: Vec<String> = Vec::new();
    let mut fix_workers = Vec::new();
    let mut num_editors = 0usize;
    let mut cut_votes = 0usize;
    let mut rejections = Vec::new();

    for assignment in &batch.assignments {
        match &assignment.answer {
            AnswerForm::Rewrite { new_text, cuttable } => {
                num_editors += 1;
                fix_workers.push(assignment.worker.clone());
                if *cuttable == Some(true) {
                    cut_votes += 1;
                }
                let rewrite = new_text.trim();
                if rewrite == editable {
                    rejections.push((assignment.clone(), COPY_PASTE_REASON.to_string()));
                } else if char_len(rewrite) >= editable_len {
                    rejections.push((assignment.clone(), NOT_SHORTER_REASON.to_string()));
                } else if !rewrites.iter().any(|r| r == rewrite) {
                    rewrites.push(rewrite.to_string());
                }
            }
            _ => rejections.push((assignment.clone(), WRONG_FORM_REASON.to_string())),
        }
    }

    ParsedFixBatch {
        rewrites,
        fix_workers,
        num_editors,
        cut_votes,
        rejections,
    }
}
