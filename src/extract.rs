//! Edit-region extraction: narrowing a free-form rewrite to the minimal
//! span of original text it touches, and re-cropping every rewrite of a
//! patch to one shared edit window.
//!
//! Offsets in this module are window-relative character offsets unless a
//! function says otherwise; [`finalize_patch_window`] converts to paragraph
//! coordinates using the patch's context window.

use miette::Diagnostic;
use thiserror::Error;

use crate::diff::{self, DiffOp};
use crate::patch::Patch;
use crate::util::slice_chars;

#[derive(Debug, Error, Diagnostic)]
pub enum ExtractError {
    /// A diff could not be cropped to the requested window. Indicates the
    /// window computation and the diff disagree about the text; the patch
    /// carrying it must be skipped rather than emitted with invalid bounds.
    #[error("diff cannot be cropped to window (prefix {prefix}, suffix {suffix})")]
    #[diagnostic(
        code(shortn::extract::uncroppable),
        help("The edit window no longer matches the option's diff; skip this patch.")
    )]
    Uncroppable { prefix: usize, suffix: usize },

    /// The computed edit window collapsed to an empty or inverted range.
    #[error("edit window is empty: [{start}, {end})")]
    #[diagnostic(code(shortn::extract::empty_window))]
    EmptyWindow { start: usize, end: usize },
}

/// Minimal edited region of a diff, in source-text character offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EditBounds {
    pub start: usize,
    pub end: usize,
}

/// Walk a diff and locate the minimal span of the original text it touches.
///
/// A cursor over the original advances through keeps and deletes. The span
/// starts at the cursor position of the first non-keep op. Its end is the
/// most advanced candidate boundary seen: for a deletion, the cursor after
/// consuming it; for an insertion, the cursor at the insertion point.
///
/// Returns `None` when the diff contains no edits.
pub fn edit_bounds(ops: &[DiffOp]) -> Option<EditBounds> {
    let mut cursor = 0usize;
    let mut start = None;
    let mut end = None;
    for op in ops {
        match op {
            DiffOp::Keep(t) => {
                cursor += t.chars().count();
            }
            DiffOp::Delete(t) => {
                start.get_or_insert(cursor);
                cursor += t.chars().count();
                end = Some(cursor);
            }
            DiffOp::Insert(_) => {
                start.get_or_insert(cursor);
                end = Some(end.map_or(cursor, |e: usize| e.max(cursor)));
            }
        }
    }
    match (start, end) {
        (Some(s), Some(e)) => Some(EditBounds { start: s, end: e }),
        _ => None,
    }
}

/// Re-crop a diff so that applying it yields only the replacement for the
/// shared window, discarding `keep_prefix` leading and `keep_suffix`
/// trailing characters of untouched context.
///
/// The discarded context is turned into deletions, mirroring how the
/// original text outside the window is not part of any candidate: the
/// leading keep run splits into a delete plus a retained keep, and
/// symmetrically at the tail.
pub fn crop_to_window(
    ops: &[DiffOp],
    keep_prefix: usize,
    keep_suffix: usize,
) -> Result<Vec<DiffOp>, ExtractError> {
    let mut out = ops.to_vec();

    if keep_prefix > 0 {
        match out.first() {
            Some(DiffOp::Keep(t)) if t.chars().count() >= keep_prefix => {
                let text = t.clone();
                let cut: String = text.chars().take(keep_prefix).collect();
                let kept: String = text.chars().skip(keep_prefix).collect();
                out.remove(0);
                if !kept.is_empty() {
                    out.insert(0, DiffOp::Keep(kept));
                }
                out.insert(0, DiffOp::Delete(cut));
            }
            _ => {
                return Err(ExtractError::Uncroppable {
                    prefix: keep_prefix,
                    suffix: keep_suffix,
                });
            }
        }
    }

    if keep_suffix > 0 {
        match out.last() {
            Some(DiffOp::Keep(t)) if t.chars().count() >= keep_suffix => {
                let text = t.clone();
                let total = text.chars().count();
                let kept: String = text.chars().take(total - keep_suffix).collect();
                let cut: String = text.chars().skip(total - keep_suffix).collect();
                out.pop();
                if !kept.is_empty() {
                    out.push(DiffOp::Keep(kept));
                }
                out.push(DiffOp::Delete(cut));
            }
            _ => {
                return Err(ExtractError::Uncroppable {
                    prefix: keep_prefix,
                    suffix: keep_suffix,
                });
            }
        }
    }

    Ok(out)
}

/// Publish a patch's shared edit window and crop every option to it.
///
/// The window is the min/max of all options' edit bounds, clamped so the
/// raw Find-stage bounds stay inside it even when no rewrite touched them.
/// Each option's `edited_text` becomes its replacement for exactly
/// `[edit_start, edit_end)`; the option's own minimal bounds are kept as
/// recorded.
pub fn finalize_patch_window(patch: &mut Patch, paragraph: &str) -> Result<(), ExtractError> {
    if patch.options.is_empty() {
        patch.edit_start = patch.start;
        patch.edit_end = patch.end;
        patch.original_text = slice_chars(paragraph, patch.start, patch.end);
        return Ok(());
    }

    let mut edit_start = patch.start;
    let mut edit_end = patch.end;
    for opt in &patch.options {
        edit_start = edit_start.min(opt.edit_start);
        edit_end = edit_end.max(opt.edit_end);
    }
    if edit_start >= edit_end {
        return Err(ExtractError::EmptyWindow {
            start: edit_start,
            end: edit_end,
        });
    }

    let keep_prefix = edit_start - patch.context_start;
    for opt in &mut patch.options {
        let keep_suffix = patch.context_end - edit_end;
        let cropped = crop_to_window(&opt.diff, keep_prefix, keep_suffix)?;
        opt.edited_text = diff::target_text(&cropped);
        opt.diff = cropped;
    }

    patch.edit_start = edit_start;
    patch.edit_end = edit_end;
    patch.original_text = slice_chars(paragraph, edit_start, edit_end);
    patch.options.sort_by_key(|o| o.edit_start);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{cleanup_semantic, diff_chars};

    #[test]
    fn bounds_of_pure_deletion() {
        let ops = cleanup_semantic(diff_chars("keep this not that", "keep this that"));
        let b = edit_bounds(&ops).unwrap();
        // "not " (or an equivalent alignment of the same length) is removed.
        assert_eq!(b.end - b.start, 4);
        assert!(b.start >= 9 && b.end <= 14);
    }

    #[test]
    fn bounds_of_pure_insertion_are_a_point() {
        let ops = diff_chars("ab", "aXb");
        let b = edit_bounds(&ops).unwrap();
        assert_eq!(b, EditBounds { start: 1, end: 1 });
    }

    #[test]
    fn no_edits_no_bounds() {
        assert!(edit_bounds(&diff_chars("same", "same")).is_none());
    }

    #[test]
    fn crop_turns_context_into_deletes() {
        let ops = diff_chars("aaa MIDDLE zzz", "aaa CENTER zzz");
        let cropped = crop_to_window(&ops, 4, 4).unwrap();
        assert_eq!(crate::diff::target_text(&cropped), "CENTER");
        assert_eq!(crate::diff::source_text(&cropped), "aaa MIDDLE zzz");
    }
}
