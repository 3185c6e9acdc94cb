//! Span aggregation behavior over synthetic worker span sets.

use shortn::aggregate::{
    agreement_threshold, aggregate_spans, validate_spans, SpanRejection, MAX_SPAN_LENGTH,
};
use shortn::patch::{Span, SpanSuggestion};

fn suggestion(worker: &str, start: usize, end: usize) -> SpanSuggestion {
    SpanSuggestion {
        worker: worker.into(),
        span: Span::new(start, end),
    }
}

fn paragraph_of_len(len: usize) -> String {
    "x".repeat(len)
}

#[test]
fn threshold_rounds_up_and_never_hits_zero() {
    assert_eq!(agreement_threshold(10, 0.20), 2);
    assert_eq!(agreement_threshold(5, 0.4), 2);
    assert_eq!(agreement_threshold(3, 0.5), 2);
    assert_eq!(agreement_threshold(10, 0.0), 1);
    assert_eq!(agreement_threshold(0, 0.2), 1);
}

#[test]
fn patch_spans_from_threshold_reach_to_active_zero() {
    // Three workers agree on [10,20), two more on [15,25). With a
    // threshold of 2 the region opens where agreement first forms and
    // stays open until every span has closed.
    let paragraph = paragraph_of_len(40);
    let spans = vec![
        suggestion("w1", 10, 20),
        suggestion("w2", 10, 20),
        suggestion("w3", 10, 20),
        suggestion("w4", 15, 25),
        suggestion("w5", 15, 25),
    ];
    let patches = aggregate_spans(&spans, 5, 0.4, 0, &paragraph);
    assert_eq!(patches.len(), 1);
    assert_eq!((patches[0].start, patches[0].end), (10, 25));
}

#[test]
fn minority_spans_produce_nothing() {
    let paragraph = paragraph_of_len(40);
    let spans = vec![suggestion("w1", 5, 15)];
    let patches = aggregate_spans(&spans, 10, 0.2, 0, &paragraph);
    assert!(patches.is_empty());
}

#[test]
fn disjoint_agreements_become_separate_patches() {
    let paragraph = paragraph_of_len(60);
    let spans = vec![
        suggestion("w1", 2, 10),
        suggestion("w2", 4, 12),
        suggestion("w3", 30, 40),
        suggestion("w4", 32, 44),
    ];
    let patches = aggregate_spans(&spans, 4, 0.5, 0, &paragraph);
    assert_eq!(patches.len(), 2);
    assert_eq!((patches[0].start, patches[0].end), (4, 12));
    assert_eq!((patches[1].start, patches[1].end), (32, 44));
}

#[test]
fn touching_spans_do_not_bridge() {
    // One span ends exactly where the other starts; the active count
    // crosses zero in between, so two patches come out.
    let paragraph = paragraph_of_len(40);
    let spans = vec![
        suggestion("w1", 0, 10),
        suggestion("w2", 0, 10),
        suggestion("w3", 10, 20),
        suggestion("w4", 10, 20),
    ];
    let patches = aggregate_spans(&spans, 4, 0.5, 0, &paragraph);
    assert_eq!(patches.len(), 2);
    assert_eq!((patches[0].start, patches[0].end), (0, 10));
    assert_eq!((patches[1].start, patches[1].end), (10, 20));
}

#[test]
fn overlong_spans_are_rejected() {
    let spans = vec![
        suggestion("w1", 0, MAX_SPAN_LENGTH + 1),
        suggestion("w2", 0, 20),
    ];
    let (accepted, rejected) = validate_spans(spans, 1000);
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].worker, "w2");
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].1, SpanRejection::TooLong);
}

#[test]
fn whole_paragraph_highlight_is_rejected_in_long_paragraphs() {
    let (accepted, rejected) = validate_spans(vec![suggestion("w1", 0, 95)], 100);
    assert!(accepted.is_empty());
    assert_eq!(rejected[0].1, SpanRejection::WholeParagraph);

    // Short paragraphs are exempt from the whole-paragraph rule.
    let (accepted, rejected) = validate_spans(vec![suggestion("w1", 0, 50)], 50);
    assert_eq!(accepted.len(), 1);
    assert!(rejected.is_empty());
}

#[test]
fn empty_spans_are_ignored_by_the_sweep() {
    let paragraph = paragraph_of_len(30);
    let spans = vec![suggestion("w1", 5, 5), suggestion("w2", 5, 5)];
    let patches = aggregate_spans(&spans, 2, 0.5, 0, &paragraph);
    assert!(patches.is_empty());
}
