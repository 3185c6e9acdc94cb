//! Verify stage: independent workers vote on the Fix stage's rewrites,
//! and the survivors become the patch's options.

use rustc_hash::FxHashMap;
use tracing::{info, instrument, warn};

use crate::config::UnverifiedPatchPolicy;
use crate::diff::{cleanup_semantic, diff_chars};
use crate::extract::{edit_bounds, finalize_patch_window};
use crate::market::{AnswerForm, Assignment};
use crate::patch::{Patch, PatchOption, WorkerId};
use crate::quorum::QuorumSpec;
use crate::tally::{VoteSubmission, VoteTally};
use crate::types::Stage;

use super::{stage_key, StageContext, StageError};

const VERIFY_TITLE: &str = "Check these shortened rewrites";
const VERIFY_DESCRIPTION: &str =
    "Mark the rewrites with grammar problems and the ones that change the meaning.";
const EMPTY_BALLOT_REASON: &str = "Please complete both parts of the voting form.";
const WRONG_FORM_REASON: &str = "Your submission did not include any votes.";

/// Run the Verify stage for one patch.
///
/// Fix workers are excluded from voting on their own rewrites. When only
/// one distinct rewrite exists it is challenged against the original
/// text, so a lone rewrite never wins by default. Returns `None` when the
/// patch ends up without options and policy (or a window inconsistency)
/// says to drop it.
#[instrument(
    skip(ctx, fix, paragraph),
    fields(paragraph = fix.patch.paragraph, patch = patch_index)
)]
pub async fn run_verify(
    ctx: &StageContext,
    fix: super::FixOutcome,
    patch_index: usize,
    paragraph: &str,
) -> Result<Option<Patch>, StageError> {
    let super::FixOutcome {
        mut patch,
        rewrites,
        fix_workers,
    } = fix;
    let editable = patch.context_text(paragraph);

    if rewrites.is_empty() {
        return finish_without_vote(ctx, patch, paragraph);
    }

    let mut candidates = rewrites;
    // A lone rewrite is voted against the original so it has competition.
    if candidates.len() == 1 && candidates[0] != editable {
        candidates.push(editable.clone());
    }

    let key = stage_key(patch.paragraph, Some(patch_index), Stage::Verify);
    let spec = QuorumSpec::for_stage(Stage::Verify, &ctx.config.verify, &ctx.config);

    let mut subs = FxHashMap::default();
    subs.insert("original".to_string(), editable.clone());
    for (i, candidate) in candidates.iter().enumerate() {
        subs.insert(format!("option{}", i + 1), candidate.clone());
    }
    let page_url = ctx.pages.render("verify", &subs).await?;
    let mut task = ctx.task_spec(
        VERIFY_TITLE,
        VERIFY_DESCRIPTION,
        page_url,
        ctx.config.verify.reward,
    );
    task.excluded_workers = fix_workers;

    let batch = ctx.collector.collect(&key, task, &spec).await?;

    let mut submissions = Vec::new();
    let mut rejections: Vec<(Assignment, String)> = Vec::new();
    let mut by_worker: FxHashMap<WorkerId, Assignment> = FxHashMap::default();
    for assignment in &batch.assignments {
        match &assignment.answer {
            AnswerForm::Votes { grammar, meaning } => {
                by_worker.insert(assignment.worker.clone(), assignment.clone());
                submissions.push(VoteSubmission {
                    worker: assignment.worker.clone(),
                    grammar: grammar.clone(),
                    meaning: meaning.clone(),
                });
            }
            _ => rejections.push((assignment.clone(), WRONG_FORM_REASON.to_string())),
        }
    }

    let (tally, invalid) = VoteTally::from_submissions(submissions);
    for sub in invalid {
        if let Some(assignment) = by_worker.get(&sub.worker) {
            rejections.push((assignment.clone(), EMPTY_BALLOT_REASON.to_string()));
        }
    }
    for (assignment, reason) in &rejections {
        ctx.reject(&key, assignment, reason).await?;
    }

    for candidate in &candidates {
        if !tally.passes(candidate) {
            continue;
        }
        let ops = cleanup_semantic(diff_chars(&editable, candidate));
        // The challenge original diffs to nothing and is dropped here.
        let Some(bounds) = edit_bounds(&ops) else {
            continue;
        };
        patch.options.push(PatchOption {
            text: candidate.clone(),
            edited_text: candidate.clone(),
            edit_start: patch.context_start + bounds.start,
            edit_end: patch.context_start + bounds.end,
            diff: ops,
            grammar_votes: tally.grammar_objections(candidate),
            meaning_votes: tally.meaning_objections(candidate),
            num_voters: tally.voters(),
        });
    }

    ctx.finish_stage(&key, &batch, ctx.config.verify.reward);
    info!(
        candidates = candidates.len(),
        passing = patch.options.len(),
        "verify stage complete"
    );

    if patch.options.is_empty() {
        return finish_without_vote(ctx, patch, paragraph);
    }
    match finalize_patch_window(&mut patch, paragraph) {
        Ok(()) => Ok(Some(patch)),
        Err(e) => {
            warn!(error = %e, "dropping patch with inconsistent edit window");
            Ok(None)
        }
    }
}

/// Apply the unverified-patch policy to a patch with no passing options.
///
/// A cuttable patch is always kept: its cut is synthesized as an option
/// when patches merge, independent of any rewrite.
fn finish_without_vote(
    ctx: &StageContext,
    mut patch: Patch,
    paragraph: &str,
) -> Result<Option<Patch>, StageError> {
    if !patch.can_cut && ctx.config.unverified_patch_policy == UnverifiedPatchPolicy::Drop {
        return Ok(None);
    }
    match finalize_patch_window(&mut patch, paragraph) {
        Ok(()) => Ok(Some(patch)),
        Err(e) => {
            warn!(error = %e, "dropping patch with inconsistent edit window");
            Ok(None)
        }
    }
}
