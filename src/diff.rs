//! Character-level diffing between an original text window and a worker
//! rewrite.
//!
//! The diff is an ordered list of [`DiffOp`]s (keep / insert / delete, each
//! carrying its substring). Downstream code walks these ops to locate the
//! minimal edited region of a rewrite and to crop rewrites to a shared edit
//! window, so op offsets must be exact: applying a diff to its source text
//! reproduces the rewrite character for character.
//!
//! The algorithm trims the common prefix/suffix, runs an LCS alignment over
//! the remaining characters, and then applies a semantic cleanup pass that
//! folds short unchanged runs sandwiched between edits into the surrounding
//! edit. Without the cleanup, incidental re-alignments ("cat" vs "cut"
//! inside a larger rewrite) fragment one human edit into several trivial
//! ones and inflate the computed edit window.

use serde::{Deserialize, Serialize};

/// One diff operation over character data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffOp {
    /// Text present in both the original and the rewrite.
    Keep(String),
    /// Text present only in the rewrite.
    Insert(String),
    /// Text present only in the original.
    Delete(String),
}

impl DiffOp {
    /// Length of the carried substring in characters.
    pub fn len_chars(&self) -> usize {
        self.text().chars().count()
    }

    pub fn text(&self) -> &str {
        match self {
            DiffOp::Keep(t) | DiffOp::Insert(t) | DiffOp::Delete(t) => t,
        }
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, DiffOp::Keep(_))
    }
}

/// Compute a character-level diff transforming `old` into `new`.
///
/// The result is normalized: adjacent ops of the same kind are coalesced,
/// and within any run of edits deletions precede insertions. Use
/// [`cleanup_semantic`] afterwards when the diff feeds edit-region
/// extraction.
pub fn diff_chars(old: &str, new: &str) -> Vec<DiffOp> {
    let o: Vec<char> = old.chars().collect();
    let n: Vec<char> = new.chars().collect();

    // Common prefix.
    let mut prefix = 0;
    while prefix < o.len() && prefix < n.len() && o[prefix] == n[prefix] {
        prefix += 1;
    }
    // Common suffix (not overlapping the prefix).
    let mut suffix = 0;
    while suffix < o.len() - prefix
        && suffix < n.len() - prefix
        && o[o.len() - 1 - suffix] == n[n.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let mid_old = &o[prefix..o.len() - suffix];
    let mid_new = &n[prefix..n.len() - suffix];

    let mut ops = Vec::new();
    if prefix > 0 {
        ops.push(DiffOp::Keep(o[..prefix].iter().collect()));
    }
    ops.extend(align(mid_old, mid_new));
    if suffix > 0 {
        ops.push(DiffOp::Keep(o[o.len() - suffix..].iter().collect()));
    }

    normalize(ops)
}

/// LCS alignment of two character slices with no common prefix/suffix.
fn align(old: &[char], new: &[char]) -> Vec<DiffOp> {
    if old.is_empty() && new.is_empty() {
        return Vec::new();
    }
    if old.is_empty() {
        return vec![DiffOp::Insert(new.iter().collect())];
    }
    if new.is_empty() {
        return vec![DiffOp::Delete(old.iter().collect())];
    }

    let m = old.len();
    let n = new.len();
    // lcs[i][j] = LCS length of old[i..] and new[j..], flattened row-major.
    let w = n + 1;
    let mut lcs = vec![0u32; (m + 1) * w];
    for i in (0..m).rev() {
        for j in (0..n).rev() {
            lcs[i * w + j] = if old[i] == new[j] {
                lcs[(i + 1) * w + j + 1] + 1
            } else {
                lcs[(i + 1) * w + j].max(lcs[i * w + j + 1])
            };
        }
    }

    let mut ops = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < m && j < n {
        if old[i] == new[j] {
            push_char(&mut ops, OpKind::Keep, old[i]);
            i += 1;
            j += 1;
        } else if lcs[(i + 1) * w + j] >= lcs[i * w + j + 1] {
            push_char(&mut ops, OpKind::Delete, old[i]);
            i += 1;
        } else {
            push_char(&mut ops, OpKind::Insert, new[j]);
            j += 1;
        }
    }
    if i < m {
        ops.push(DiffOp::Delete(old[i..].iter().collect()));
    }
    if j < n {
        ops.push(DiffOp::Insert(new[j..].iter().collect()));
    }
    ops
}

#[derive(Clone, Copy, PartialEq)]
enum OpKind {
    Keep,
    Insert,
    Delete,
}

fn push_char(ops: &mut Vec<DiffOp>, kind: OpKind, c: char) {
    if let Some(last) = ops.last_mut() {
        let matches = matches!(
            (&last, kind),
            (DiffOp::Keep(_), OpKind::Keep)
                | (DiffOp::Insert(_), OpKind::Insert)
                | (DiffOp::Delete(_), OpKind::Delete)
        );
        if matches {
            match last {
                DiffOp::Keep(t) | DiffOp::Insert(t) | DiffOp::Delete(t) => t.push(c),
            }
            return;
        }
    }
    let mut s = String::new();
    s.push(c);
    ops.push(match kind {
        OpKind::Keep => DiffOp::Keep(s),
        OpKind::Insert => DiffOp::Insert(s),
        OpKind::Delete => DiffOp::Delete(s),
    });
}

/// Coalesce adjacent same-kind ops, drop empties, and order every edit
/// cluster as a single deletion followed by a single insertion.
pub fn normalize(ops: Vec<DiffOp>) -> Vec<DiffOp> {
    let mut out: Vec<DiffOp> = Vec::with_capacity(ops.len());
    let mut del = String::new();
    let mut ins = String::new();

    let mut flush = |out: &mut Vec<DiffOp>, del: &mut String, ins: &mut String| {
        if !del.is_empty() {
            out.push(DiffOp::Delete(std::mem::take(del)));
        }
        if !ins.is_empty() {
            out.push(DiffOp::Insert(std::mem::take(ins)));
        }
    };

    for op in ops {
        match op {
            DiffOp::Keep(t) => {
                if t.is_empty() {
                    continue;
                }
                flush(&mut out, &mut del, &mut ins);
                if let Some(DiffOp::Keep(prev)) = out.last_mut() {
                    prev.push_str(&t);
                } else {
                    out.push(DiffOp::Keep(t));
                }
            }
            DiffOp::Delete(t) => del.push_str(&t),
            DiffOp::Insert(t) => ins.push_str(&t),
        }
    }
    flush(&mut out, &mut del, &mut ins);
    out
}

/// Fold short unchanged runs between two edits into the surrounding edit.
///
/// A kept run is folded when it is no longer than the larger edit on each
/// side, the same criterion diff-match-patch applies. Folding rewrites the
/// kept text as a deletion plus an identical insertion, which the following
/// normalization merges with its neighbors into one contiguous edit.
pub fn cleanup_semantic(ops: Vec<DiffOp>) -> Vec<DiffOp> {
    let mut ops = normalize(ops);
    loop {
        let mut folded = None;
        for idx in 1..ops.len().saturating_sub(1) {
            let DiffOp::Keep(text) = &ops[idx] else {
                continue;
            };
            let keep_len = text.chars().count();
            let (ins_before, del_before) = edit_mass(ops[..idx].iter().rev());
            let (ins_after, del_after) = edit_mass(ops[idx + 1..].iter());
            if (ins_before > 0 || del_before > 0)
                && (ins_after > 0 || del_after > 0)
                && keep_len <= ins_before.max(del_before)
                && keep_len <= ins_after.max(del_after)
            {
                folded = Some(idx);
                break;
            }
        }
        match folded {
            Some(idx) => {
                let DiffOp::Keep(text) = ops.remove(idx) else {
                    unreachable!()
                };
                ops.insert(idx, DiffOp::Insert(text.clone()));
                ops.insert(idx, DiffOp::Delete(text));
                ops = normalize(ops);
            }
            None => return ops,
        }
    }
}

/// Insert/delete character counts of the edit run adjacent to a kept run.
fn edit_mass<'a>(ops: impl Iterator<Item = &'a DiffOp>) -> (usize, usize) {
    let (mut ins, mut del) = (0, 0);
    for op in ops {
        match op {
            DiffOp::Insert(t) => ins += t.chars().count(),
            DiffOp::Delete(t) => del += t.chars().count(),
            DiffOp::Keep(_) => break,
        }
    }
    (ins, del)
}

/// Text produced by applying the diff (keeps plus insertions).
pub fn target_text(ops: &[DiffOp]) -> String {
    let mut out = String::new();
    for op in ops {
        match op {
            DiffOp::Keep(t) | DiffOp::Insert(t) => out.push_str(t),
            DiffOp::Delete(_) => {}
        }
    }
    out
}

/// Text the diff was computed against (keeps plus deletions).
pub fn source_text(ops: &[DiffOp]) -> String {
    let mut out = String::new();
    for op in ops {
        match op {
            DiffOp::Keep(t) | DiffOp::Delete(t) => out.push_str(t),
            DiffOp::Insert(_) => {}
        }
    }
    out
}
