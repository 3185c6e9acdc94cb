//! Merging patches whose edit windows overlap.
//!
//! Patches are independent through Fix and Verify, but widened edit windows
//! can end up overlapping. A downstream consumer picking one option per
//! patch needs disjoint windows, so overlapping patches collapse into one
//! composite patch whose options are each contributor's options re-grafted
//! onto the union window.

use tracing::debug;

use crate::diff::{diff_chars, normalize};
use crate::patch::{Patch, PatchOption};
use crate::util::slice_chars;

/// Merge patches with overlapping or touching edit windows.
///
/// Sorts by `edit_start`, then sweeps once, grouping while the next
/// patch's window starts at or before the running maximum window end.
/// Singleton groups pass through unchanged; the output is sorted by
/// `start` and its edit windows are pairwise disjoint.
pub fn merge_overlapping(mut patches: Vec<Patch>, paragraph: &str) -> Vec<Patch> {
    if patches.is_empty() {
        return patches;
    }
    patches.sort_by_key(|p| p.edit_start);

    let mut merged = Vec::new();
    let mut group: Vec<Patch> = Vec::new();
    let mut group_end = 0usize;
    for patch in patches {
        if group.is_empty() || patch.edit_start <= group_end {
            group_end = group_end.max(patch.edit_end);
            group.push(patch);
        } else {
            merged.push(merge_group(std::mem::take(&mut group), paragraph));
            group_end = patch.edit_end;
            group.push(patch);
        }
    }
    merged.push(merge_group(group, paragraph));

    merged.sort_by_key(|p| p.start);
    merged
}

/// Collapse one overlap group into a single patch.
fn merge_group(mut group: Vec<Patch>, paragraph: &str) -> Patch {
    if group.len() == 1 {
        return group.pop().expect("group is non-empty");
    }

    let first = &group[0];
    let (mut start, mut end) = (first.start, first.end);
    let (mut edit_start, mut edit_end) = (first.edit_start, first.edit_end);
    let (mut context_start, mut context_end) = (first.context_start, first.context_end);
    for p in &group[1..] {
        start = start.min(p.start);
        end = end.max(p.end);
        edit_start = edit_start.min(p.edit_start);
        edit_end = edit_end.max(p.edit_end);
        context_start = context_start.min(p.context_start);
        context_end = context_end.max(p.context_end);
    }
    debug!(
        members = group.len(),
        edit_start, edit_end, "merging overlapping patches"
    );

    let mut composite = Patch {
        paragraph: first.paragraph,
        start,
        end,
        context_start,
        context_end,
        edit_start,
        edit_end,
        original_text: slice_chars(paragraph, edit_start, edit_end),
        // Cuttability now lives per option; the composite itself is never
        // cut wholesale.
        can_cut: false,
        cut_votes: 0,
        num_editors: group.iter().map(|p| p.num_editors).sum(),
        merged: true,
        options: Vec::new(),
    };

    for member in &group {
        composite
            .options
            .extend(regraft_options(member, edit_start, edit_end, paragraph));
    }
    composite
}

/// Re-express one member's options over the merged window.
///
/// Each option keeps its own replacement for the member's sub-window and
/// takes the merged window's untouched original text as prefix and suffix.
/// Its diff is recomputed against the merged window, so re-applying it
/// still yields `edited_text`. A member voted cuttable additionally
/// contributes an option excising exactly its `[start, end)` region.
fn regraft_options(
    member: &Patch,
    edit_start: usize,
    edit_end: usize,
    paragraph: &str,
) -> Vec<PatchOption> {
    let window = slice_chars(paragraph, edit_start, edit_end);
    let prefix = slice_chars(paragraph, edit_start, member.edit_start);
    let suffix = slice_chars(paragraph, member.edit_end, edit_end);

    let mut options = Vec::with_capacity(member.options.len() + 1);
    for opt in &member.options {
        let text = format!("{prefix}{}{suffix}", opt.edited_text);
        options.push(PatchOption {
            text: text.clone(),
            edited_text: text.clone(),
            edit_start,
            edit_end,
            diff: normalize(diff_chars(&window, &text)),
            grammar_votes: opt.grammar_votes,
            meaning_votes: opt.meaning_votes,
            num_voters: opt.num_voters,
        });
    }

    if member.can_cut {
        let cut_prefix = slice_chars(paragraph, edit_start, member.start);
        let cut_suffix = slice_chars(paragraph, member.end, edit_end);
        let text = format!("{cut_prefix}{cut_suffix}");
        options.push(PatchOption {
            text: text.clone(),
            edited_text: text.clone(),
            edit_start,
            edit_end,
            diff: normalize(diff_chars(&window, &text)),
            grammar_votes: 0,
            meaning_votes: 0,
            num_voters: member.num_editors,
        });
    }

    options
}
