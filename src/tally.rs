//! Vote counting for the Verify stage.
//!
//! Workers vote by naming the candidates they object to under two
//! categories: grammar problems and meaning changes. Candidates pass a
//! category when objections stay strictly under half the valid voters, and
//! survive only by passing both.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::patch::WorkerId;

/// One worker's verify-stage ballot.
///
/// `None` means the field was absent from the submitted form; a ballot with
/// both fields absent is invalid and its worker is flagged. An empty list
/// is a valid "no objections" answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSubmission {
    pub worker: WorkerId,
    pub grammar: Option<Vec<String>>,
    pub meaning: Option<Vec<String>>,
}

impl VoteSubmission {
    pub fn is_valid(&self) -> bool {
        self.grammar.is_some() || self.meaning.is_some()
    }
}

/// Objection counts per candidate text, per category.
#[derive(Clone, Debug, Default)]
pub struct VoteTally {
    grammar: FxHashMap<String, usize>,
    meaning: FxHashMap<String, usize>,
    voters: usize,
}

impl VoteTally {
    /// Tally valid submissions, returning the invalid ones for rejection.
    pub fn from_submissions(submissions: Vec<VoteSubmission>) -> (Self, Vec<VoteSubmission>) {
        let mut tally = VoteTally::default();
        let mut invalid = Vec::new();
        for sub in submissions {
            if !sub.is_valid() {
                invalid.push(sub);
                continue;
            }
            tally.voters += 1;
            for candidate in sub.grammar.iter().flatten() {
                *tally.grammar.entry(candidate.clone()).or_insert(0) += 1;
            }
            for candidate in sub.meaning.iter().flatten() {
                *tally.meaning.entry(candidate.clone()).or_insert(0) += 1;
            }
        }
        (tally, invalid)
    }

    /// Number of valid voters counted.
    pub fn voters(&self) -> usize {
        self.voters
    }

    pub fn grammar_objections(&self, candidate: &str) -> usize {
        self.grammar.get(candidate).copied().unwrap_or(0)
    }

    pub fn meaning_objections(&self, candidate: &str) -> usize {
        self.meaning.get(candidate).copied().unwrap_or(0)
    }

    /// A candidate passes a category iff objections are strictly less than
    /// half the valid voters.
    pub fn passes_grammar(&self, candidate: &str) -> bool {
        2 * self.grammar_objections(candidate) < self.voters
    }

    pub fn passes_meaning(&self, candidate: &str) -> bool {
        2 * self.meaning_objections(candidate) < self.voters
    }

    /// Retained iff the candidate passes both categories.
    pub fn passes(&self, candidate: &str) -> bool {
        self.passes_grammar(candidate) && self.passes_meaning(candidate)
    }
}

/// Fix-stage binary cuttability: a strict majority of all responses.
pub fn can_cut(yes_votes: usize, total_responses: usize) -> bool {
    2 * yes_votes > total_responses
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ballot(worker: &str, grammar: &[&str], meaning: &[&str]) -> VoteSubmission {
        VoteSubmission {
            worker: worker.into(),
            grammar: Some(grammar.iter().map(|s| s.to_string()).collect()),
            meaning: Some(meaning.iter().map(|s| s.to_string()).collect()),
        }
    }

    #[test]
    fn half_objections_fail() {
        let subs = vec![
            ballot("w1", &["cand"], &[]),
            ballot("w2", &["cand"], &[]),
            ballot("w3", &[], &[]),
            ballot("w4", &[], &[]),
        ];
        let (tally, invalid) = VoteTally::from_submissions(subs);
        assert!(invalid.is_empty());
        // 2 of 4 objections is exactly half: not strictly less.
        assert!(!tally.passes_grammar("cand"));
        assert!(!tally.passes("cand"));
    }

    #[test]
    fn zero_objections_always_pass() {
        let subs = vec![ballot("w1", &["other"], &["other"]), ballot("w2", &[], &[])];
        let (tally, _) = VoteTally::from_submissions(subs);
        assert!(tally.passes("clean"));
    }

    #[test]
    fn empty_ballot_is_invalid() {
        let subs = vec![
            VoteSubmission {
                worker: "w1".into(),
                grammar: None,
                meaning: None,
            },
            ballot("w2", &[], &[]),
        ];
        let (tally, invalid) = VoteTally::from_submissions(subs);
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].worker, "w1");
        assert_eq!(tally.voters(), 1);
    }

    #[test]
    fn cuttability_needs_strict_majority() {
        assert!(!can_cut(2, 4));
        assert!(can_cut(3, 4));
        assert!(!can_cut(0, 0));
    }
}
