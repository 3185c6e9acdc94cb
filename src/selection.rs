//! Length-selection planning over finalized patches.
//!
//! Every patch contributes a small choice set: keep its original window
//! text, or substitute one of its verified options. A consumer (typically
//! a slider UI) asks for "the version closest to length L without going
//! over". Enumerating the Cartesian product of choices is exponential in
//! the number of patches, so the plan is built once with a multi-choice
//! subset-sum dynamic program over achievable total lengths, keeping one
//! witnessing selection per total; queries then only search the
//! precomputed table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::patch::Patch;
use crate::util::char_len;

/// One choice for one patch inside a selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchChoice {
    /// Index of the patch in the planned patch list.
    pub patch_index: usize,
    /// `None` keeps the original window text; `Some(i)` picks option `i`.
    pub option_index: Option<usize>,
    /// The chosen replacement text for the patch's edit window.
    pub text: String,
}

/// A full selection: one choice per patch, plus its total length.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub total_length: usize,
    pub choices: Vec<PatchChoice>,
}

/// Precomputed achievable totals with one witnessing selection each.
///
/// Totals count only the text inside patch edit windows; the surrounding
/// paragraph text is identical across selections and irrelevant to
/// relative ordering.
#[derive(Clone, Debug, Default)]
pub struct LengthPlan {
    /// Per patch: the candidate texts, index 0 being the original.
    choices: Vec<Vec<String>>,
    /// total length -> per-patch choice index achieving it.
    totals: BTreeMap<usize, Vec<usize>>,
}

impl LengthPlan {
    /// Build the plan for a finalized, merged patch list.
    pub fn new(patches: &[Patch]) -> Self {
        let choices: Vec<Vec<String>> = patches
            .iter()
            .map(|p| {
                let mut texts = Vec::with_capacity(p.options.len() + 1);
                texts.push(p.original_text.clone());
                texts.extend(p.options.iter().map(|o| o.edited_text.clone()));
                texts
            })
            .collect();

        // Multi-choice subset sum: extend every achievable total by every
        // choice of the next patch. First witness found for a total wins;
        // ascending iteration keeps ties deterministic in patch order.
        let mut totals: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        totals.insert(0, Vec::new());
        for patch_choices in &choices {
            let mut next: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
            for (total, witness) in &totals {
                for (idx, text) in patch_choices.iter().enumerate() {
                    let sum = total + char_len(text);
                    next.entry(sum).or_insert_with(|| {
                        let mut w = witness.clone();
                        w.push(idx);
                        w
                    });
                }
            }
            totals = next;
        }
        if choices.is_empty() {
            totals.clear();
        }

        Self { choices, totals }
    }

    /// All achievable total lengths, ascending.
    pub fn possible_lengths(&self) -> Vec<usize> {
        self.totals.keys().copied().collect()
    }

    /// Shortest achievable total, if any patch exists.
    pub fn shortest(&self) -> Option<usize> {
        self.totals.keys().next().copied()
    }

    /// Longest achievable total, if any patch exists.
    pub fn longest(&self) -> Option<usize> {
        self.totals.keys().next_back().copied()
    }

    /// The selection whose total is closest to `target` without exceeding
    /// it; when every total exceeds `target`, the shortest achievable one.
    pub fn select(&self, target: usize) -> Option<Selection> {
        let (total, witness) = self
            .totals
            .range(..=target)
            .next_back()
            .or_else(|| self.totals.iter().next())?;
        let choices = witness
            .iter()
            .enumerate()
            .map(|(patch_index, &choice)| PatchChoice {
                patch_index,
                option_index: choice.checked_sub(1),
                text: self.choices[patch_index][choice].clone(),
            })
            .collect();
        Some(Selection {
            total_length: *total,
            choices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{Patch, PatchOption};

    fn patch_with_lengths(paragraph: &str, start: usize, end: usize, options: &[&str]) -> Patch {
        let mut p = Patch::new(0, start, end, paragraph);
        p.edit_start = start;
        p.edit_end = end;
        for text in options {
            p.options.push(PatchOption {
                text: text.to_string(),
                edited_text: text.to_string(),
                edit_start: start,
                edit_end: end,
                diff: Vec::new(),
                grammar_votes: 0,
                meaning_votes: 0,
                num_voters: 0,
            });
        }
        p
    }

    #[test]
    fn plan_is_deterministic() {
        let paragraph = "abcdefghij";
        let patches = vec![
            patch_with_lengths(paragraph, 0, 5, &["abc"]),
            patch_with_lengths(paragraph, 5, 9, &["xy"]),
        ];
        let a = LengthPlan::new(&patches);
        let b = LengthPlan::new(&patches);
        assert_eq!(a.possible_lengths(), b.possible_lengths());
        assert_eq!(a.select(7), b.select(7));
    }
}
