//! Core data model for candidate edit regions and their rewrites.
//!
//! A [`Patch`] is born in the Find stage as a bare cut region, gathers
//! rewrite [`PatchOption`]s through Fix and Verify, and may finally be
//! replaced by a merged composite when edit windows overlap. All offsets
//! are character offsets into the owning paragraph.

use serde::{Deserialize, Serialize};

use crate::diff::DiffOp;
use crate::util::{sentence_window, slice_chars};

/// Identifier a task market assigns to one human respondent.
pub type WorkerId = String;

/// A half-open character span `[start, end)` over one paragraph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// One worker's proposed cuttable span, tagged with its submitter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanSuggestion {
    pub worker: WorkerId,
    pub span: Span,
}

/// One candidate replacement for a patch's edit window.
///
/// Immutable once the owning patch's window is finalized: `edited_text` is
/// the rewrite cropped to the shared window, while `edit_start`/`edit_end`
/// keep this option's own minimal touched span in paragraph coordinates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOption {
    /// The full rewrite as the worker submitted it.
    pub text: String,
    /// The rewrite cropped to the patch's shared edit window.
    pub edited_text: String,
    /// Start of this option's own minimal edited span.
    pub edit_start: usize,
    /// End of this option's own minimal edited span.
    pub edit_end: usize,
    /// Diff between the patch's context window and the rewrite,
    /// window-cropped once the patch is finalized.
    pub diff: Vec<DiffOp>,
    /// Workers objecting to this candidate's grammar.
    pub grammar_votes: usize,
    /// Workers objecting that this candidate changes the meaning.
    pub meaning_votes: usize,
    /// Valid voters that judged this candidate.
    pub num_voters: usize,
}

/// A candidate edit region within one paragraph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// Index of the owning paragraph.
    pub paragraph: usize,
    /// Start of the agreed cut region from the Find stage.
    pub start: usize,
    /// End of the agreed cut region from the Find stage.
    pub end: usize,
    /// Start of the sentence-aligned context shown to Fix workers.
    pub context_start: usize,
    /// End of the sentence-aligned context shown to Fix workers.
    pub context_end: usize,
    /// Start of the widened edit window; `edit_start <= start`.
    pub edit_start: usize,
    /// End of the widened edit window; `edit_end >= end`.
    pub edit_end: usize,
    /// Original paragraph text within `[edit_start, edit_end)`.
    pub original_text: String,
    /// Whether Fix workers judged the region outright cuttable.
    pub can_cut: bool,
    /// Number of Fix workers voting the region cuttable.
    pub cut_votes: usize,
    /// Number of Fix workers that responded for this patch.
    pub num_editors: usize,
    /// True when this patch is a composite of overlapping patches.
    pub merged: bool,
    /// Verified candidate replacements, ordered by `edit_start`.
    pub options: Vec<PatchOption>,
}

impl Patch {
    /// Create a patch for the cut region `[start, end)`, deriving the
    /// sentence-aligned context window from the paragraph text.
    pub fn new(paragraph_index: usize, start: usize, end: usize, paragraph: &str) -> Self {
        let (context_start, context_end) = sentence_window(paragraph, start, end);
        Self {
            paragraph: paragraph_index,
            start,
            end,
            context_start,
            context_end,
            edit_start: start,
            edit_end: end,
            original_text: slice_chars(paragraph, start, end),
            can_cut: false,
            cut_votes: 0,
            num_editors: 0,
            merged: false,
            options: Vec::new(),
        }
    }

    /// Sentence-aligned text Fix workers see and rewrites are diffed against.
    pub fn context_text(&self, paragraph: &str) -> String {
        slice_chars(paragraph, self.context_start, self.context_end)
    }

    /// The edit window `[edit_start, edit_end)` as a span.
    pub fn edit_window(&self) -> Span {
        Span::new(self.edit_start, self.edit_end)
    }
}
