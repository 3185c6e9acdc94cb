//! Span aggregation for the Find stage.
//!
//! Many workers independently mark spans they consider cuttable; this
//! module validates those spans and sweeps them into agreed-upon patches.
//! The sweep is interval stabbing, not a union of overlapping spans:
//! a patch opens only where enough spans are simultaneously active, so
//! isolated minority opinions never produce output.

use tracing::debug;

use crate::patch::{Patch, SpanSuggestion};

/// Spans longer than this are not considered real selections.
pub const MAX_SPAN_LENGTH: usize = 250;

/// Fraction of the paragraph a span may cover before it counts as
/// highlighting the whole paragraph (applies from
/// [`WHOLE_PARAGRAPH_MIN_LEN`] upward).
pub const WHOLE_PARAGRAPH_FRACTION: f64 = 0.90;

/// Paragraph length from which the whole-paragraph check applies.
pub const WHOLE_PARAGRAPH_MIN_LEN: usize = 100;

/// Why a span suggestion was excluded from aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpanRejection {
    /// The span exceeds [`MAX_SPAN_LENGTH`].
    TooLong,
    /// The span covers nearly the whole paragraph.
    WholeParagraph,
}

impl SpanRejection {
    /// Human-readable reason sent back to the rejected worker.
    pub fn reason(&self) -> &'static str {
        match self {
            SpanRejection::TooLong => {
                "Please mark specific areas rather than huge chunks of the paragraph."
            }
            SpanRejection::WholeParagraph => {
                "It is not fair to highlight nearly the whole paragraph; \
                 we are looking for specific areas."
            }
        }
    }
}

/// Split suggestions into accepted spans and rejections.
///
/// `paragraph_len` is in characters. Rejected suggestions are returned with
/// their reason so the stage driver can flag the submitting workers.
pub fn validate_spans(
    suggestions: Vec<SpanSuggestion>,
    paragraph_len: usize,
) -> (Vec<SpanSuggestion>, Vec<(SpanSuggestion, SpanRejection)>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for s in suggestions {
        let len = s.span.len();
        if len > MAX_SPAN_LENGTH {
            rejected.push((s, SpanRejection::TooLong));
        } else if paragraph_len >= WHOLE_PARAGRAPH_MIN_LEN
            && (len as f64) >= WHOLE_PARAGRAPH_FRACTION * paragraph_len as f64
        {
            rejected.push((s, SpanRejection::WholeParagraph));
        } else {
            accepted.push(s);
        }
    }
    accepted.sort_by_key(|s| (s.span.start, s.span.end));
    (accepted, rejected)
}

/// Agreement threshold: `max(1, ceil(workers × minimum_agreement))`.
pub fn agreement_threshold(num_workers: usize, minimum_agreement: f64) -> usize {
    ((num_workers as f64 * minimum_agreement).ceil() as usize).max(1)
}

/// Sweep accepted spans into agreed patches.
///
/// Walks every character offset in increasing order, maintaining the count
/// of active spans. A patch opens at the first offset where the active
/// count reaches the agreement threshold (and none is open) and closes at
/// the first offset where the count returns to zero. Opens and closes are
/// sequential; two patches are never open at once.
pub fn aggregate_spans(
    accepted: &[SpanSuggestion],
    num_workers: usize,
    minimum_agreement: f64,
    paragraph_index: usize,
    paragraph: &str,
) -> Vec<Patch> {
    let len = crate::util::char_len(paragraph);
    let threshold = agreement_threshold(num_workers, minimum_agreement);
    debug!(
        num_workers,
        threshold,
        spans = accepted.len(),
        "aggregating find-stage spans"
    );

    // Span endpoints bucketed per offset; ends processed before starts so
    // that spans touching at an offset do not bridge through it.
    let mut starts = vec![0usize; len + 2];
    let mut ends = vec![0usize; len + 2];
    for s in accepted {
        if s.span.is_empty() {
            continue;
        }
        starts[s.span.start.min(len)] += 1;
        ends[s.span.end.min(len)] += 1;
    }

    let mut patches = Vec::new();
    let mut active = 0usize;
    let mut open_at: Option<usize> = None;
    for offset in 0..=len {
        active -= ends[offset].min(active);
        if active == 0 {
            if let Some(start) = open_at.take() {
                patches.push(Patch::new(paragraph_index, start, offset, paragraph));
            }
        }
        active += starts[offset];
        if open_at.is_none() && active >= threshold {
            open_at = Some(offset);
        }
    }
    // Spans are clamped to the paragraph, so the sweep always drains.
    debug_assert!(open_at.is_none());

    patches
}
