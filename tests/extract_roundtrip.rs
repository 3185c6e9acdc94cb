//! Diff and edit-window round-trip properties.

use proptest::prelude::*;

use shortn::diff::{cleanup_semantic, diff_chars, source_text, target_text, DiffOp};
use shortn::extract::{crop_to_window, edit_bounds, finalize_patch_window};
use shortn::patch::{Patch, PatchOption};
use shortn::util::{char_len, slice_chars};

// Small alphabet with a multibyte character so char/byte offset
// confusion cannot hide.
fn text() -> impl Strategy<Value = String> {
    proptest::collection::vec(prop_oneof![Just('a'), Just('b'), Just(' '), Just('é')], 0..12)
        .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    #[test]
    fn diff_reproduces_both_sides(a in text(), b in text()) {
        let ops = cleanup_semantic(diff_chars(&a, &b));
        prop_assert_eq!(source_text(&ops), a);
        prop_assert_eq!(target_text(&ops), b);
    }

    #[test]
    fn cropping_discards_exactly_the_shared_context(
        prefix in text(),
        mid_a in text(),
        mid_b in text(),
        suffix in text(),
    ) {
        let a = format!("{prefix}{mid_a}{suffix}");
        let b = format!("{prefix}{mid_b}{suffix}");
        let ops = cleanup_semantic(diff_chars(&a, &b));

        let p = char_len(&prefix);
        let s = char_len(&suffix);
        // Cropping needs the keep runs to still be there: the prefix trim
        // can swallow a matching suffix (e.g. "aa" vs "a"), so check the
        // actual ops rather than the generated context lengths.
        let lead = match ops.first() {
            Some(DiffOp::Keep(t)) => char_len(t),
            _ => 0,
        };
        let trail = match ops.last() {
            Some(DiffOp::Keep(t)) => char_len(t),
            _ => 0,
        };
        prop_assume!(p <= lead && s <= trail);
        prop_assume!(ops.len() > 1 || p + s <= lead);

        let cropped = crop_to_window(&ops, p, s).unwrap();
        prop_assert_eq!(source_text(&cropped), a.clone());
        prop_assert_eq!(
            target_text(&cropped),
            slice_chars(&b, p, char_len(&b) - s)
        );
    }
}

#[test]
fn finalized_options_substitute_cleanly() {
    let paragraph = "First part stays. The middle bit is far too long here. Tail stays.";
    // Cut region agreed by Find inside the second sentence.
    let mut patch = Patch::new(0, 33, 44, paragraph);
    let context = patch.context_text(paragraph);

    for candidate in ["The middle bit is long here.", "The middle is too long here."] {
        let ops = cleanup_semantic(diff_chars(&context, candidate));
        let bounds = edit_bounds(&ops).unwrap();
        patch.options.push(PatchOption {
            text: candidate.to_string(),
            edited_text: candidate.to_string(),
            edit_start: patch.context_start + bounds.start,
            edit_end: patch.context_start + bounds.end,
            diff: ops,
            grammar_votes: 0,
            meaning_votes: 0,
            num_voters: 3,
        });
    }
    finalize_patch_window(&mut patch, paragraph).unwrap();

    assert!(patch.edit_start <= patch.start);
    assert!(patch.edit_end >= patch.end);
    let len = char_len(paragraph);
    // Finalizing may reorder options; match them back up by full text.
    for opt in &patch.options {
        let candidate = opt.text.as_str();
        // Splicing the cropped replacement into the paragraph must equal
        // substituting the full candidate for the context window.
        let spliced = format!(
            "{}{}{}",
            slice_chars(paragraph, 0, patch.edit_start),
            opt.edited_text,
            slice_chars(paragraph, patch.edit_end, len),
        );
        let expected = format!(
            "{}{}{}",
            slice_chars(paragraph, 0, patch.context_start),
            candidate,
            slice_chars(paragraph, patch.context_end, len),
        );
        assert_eq!(spliced, expected);
    }
}
