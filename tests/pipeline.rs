//! End-to-end runs over a scripted market.

use std::sync::Arc;

use shortn::config::{PipelineConfig, StageConfig};
use shortn::document::StaticDocument;
use shortn::market::{AnswerForm, ScriptedMarket};
use shortn::patch::Span;
use shortn::runtime::{InMemoryLedger, Pipeline, StepLedger};
use shortn::types::Stage;
use shortn::util::slice_chars;

const PARAGRAPH: &str = "Alpha beta. This sentence is very very wordy indeed. Gamma delta.";
const SENTENCE: &str = "This sentence is very very wordy indeed.";
const REWRITE: &str = "This sentence is wordy.";

fn test_config() -> PipelineConfig {
    PipelineConfig {
        buffer_redundancy: 0,
        wait_time_ms: 200,
        time_bounded: true,
        poll_interval_ms: 5,
        max_extension_rounds: 2,
        find: StageConfig {
            reward: 0.01,
            minimum_agreement: 0.4,
            redundancy: 5,
            minimum_workers: 3,
        },
        fix: StageConfig {
            reward: 0.05,
            minimum_agreement: 0.0,
            redundancy: 3,
            minimum_workers: 2,
        },
        verify: StageConfig {
            reward: 0.02,
            minimum_agreement: 0.0,
            redundancy: 3,
            minimum_workers: 2,
        },
        ..PipelineConfig::default()
    }
}

fn spans(pairs: &[(usize, usize)]) -> AnswerForm {
    AnswerForm::Spans {
        spans: pairs.iter().map(|&(s, e)| Span::new(s, e)).collect(),
    }
}

fn ballot(grammar: &[&str], meaning: &[&str]) -> AnswerForm {
    AnswerForm::Votes {
        grammar: Some(grammar.iter().map(|s| s.to_string()).collect()),
        meaning: Some(meaning.iter().map(|s| s.to_string()).collect()),
    }
}

/// Script the Find stage: three workers agree on the wordy sentence.
fn script_find(market: &ScriptedMarket) {
    market.script_task(vec![
        ("w1".into(), spans(&[(12, 52)])),
        ("w2".into(), spans(&[(12, 52)])),
        ("w3".into(), spans(&[(12, 52)])),
        ("w4".into(), spans(&[(20, 30)])),
        ("w5".into(), spans(&[])),
    ]);
}

#[tokio::test]
async fn cuttable_sentence_yields_one_verified_patch() {
    let market = Arc::new(ScriptedMarket::new());
    script_find(&market);
    market.script_task(vec![
        (
            "w6".into(),
            AnswerForm::Rewrite {
                new_text: REWRITE.into(),
                cuttable: Some(true),
            },
        ),
        (
            "w7".into(),
            AnswerForm::Rewrite {
                new_text: REWRITE.into(),
                cuttable: Some(true),
            },
        ),
        (
            "w8".into(),
            AnswerForm::Rewrite {
                new_text: SENTENCE.into(),
                cuttable: Some(false),
            },
        ),
    ]);
    market.script_task(vec![
        ("w9".into(), ballot(&[], &[])),
        ("w10".into(), ballot(&[], &[])),
        ("w11".into(), ballot(&[], &[])),
    ]);

    let document = Arc::new(StaticDocument::new(vec![PARAGRAPH.to_string()]));
    let pipeline = Pipeline::builder(market.clone(), document)
        .with_config(test_config())
        .build();
    let report = pipeline.run().await.unwrap();

    assert!(report.suspended.is_empty());
    assert_eq!(report.paragraphs.len(), 1);
    let result = &report.paragraphs[0];
    assert_eq!(result.patches.len(), 1);

    let patch = &result.patches[0];
    assert_eq!((patch.start, patch.end), (12, 52));
    assert_eq!(patch.original_text, SENTENCE);
    assert!(patch.can_cut);
    assert_eq!(patch.cut_votes, 2);
    assert_eq!(patch.num_editors, 3);

    // The duplicate rewrite collapsed to one option; the challenge
    // original never becomes an option.
    assert_eq!(patch.options.len(), 1);
    let option = &patch.options[0];
    assert_eq!(option.edited_text, REWRITE);
    assert_eq!(option.num_voters, 3);

    // Splicing the option into the paragraph applies the rewrite exactly.
    let spliced = format!(
        "{}{}{}",
        slice_chars(PARAGRAPH, 0, patch.edit_start),
        option.edited_text,
        slice_chars(PARAGRAPH, patch.edit_end, PARAGRAPH.chars().count()),
    );
    assert_eq!(spliced, "Alpha beta. This sentence is wordy. Gamma delta.");

    // Length plan: original 40 chars vs rewrite 23.
    assert_eq!(result.plan.possible_lengths(), vec![23, 40]);
    assert_eq!(result.plan.select(30).unwrap().total_length, 23);

    // One task per stage, copy-paste rewrite flagged.
    assert_eq!(market.created_tasks(), 3);
    assert_eq!(market.extensions(), 0);
    let rejections = market.rejections();
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].worker, "w8");
    assert!(report
        .rejected_workers
        .iter()
        .any(|r| r.worker == "w8" && r.stage == Stage::Fix));
}

#[tokio::test]
async fn rerun_over_the_same_ledger_touches_no_tasks() {
    let market = Arc::new(ScriptedMarket::new());
    script_find(&market);
    market.script_task(vec![
        (
            "w6".into(),
            AnswerForm::Rewrite {
                new_text: REWRITE.into(),
                cuttable: Some(true),
            },
        ),
        (
            "w7".into(),
            AnswerForm::Rewrite {
                new_text: "This one is wordy.".into(),
                cuttable: Some(true),
            },
        ),
    ]);
    market.script_task(vec![
        ("w9".into(), ballot(&[], &["This one is wordy."])),
        ("w10".into(), ballot(&[], &["This one is wordy."])),
        ("w11".into(), ballot(&[], &[])),
    ]);

    let ledger: Arc<dyn StepLedger> = Arc::new(InMemoryLedger::new());
    let document = Arc::new(StaticDocument::new(vec![PARAGRAPH.to_string()]));

    let first = Pipeline::builder(market.clone(), document.clone())
        .with_ledger(Arc::clone(&ledger))
        .with_config(test_config())
        .build();
    let first_report = first.run().await.unwrap();
    assert_eq!(first_report.paragraphs.len(), 1);
    let created = market.created_tasks();

    // Same ledger, fresh pipeline: everything replays from records.
    let second = Pipeline::builder(market.clone(), document)
        .with_ledger(ledger)
        .with_config(test_config())
        .build();
    let second_report = second.run().await.unwrap();

    assert_eq!(market.created_tasks(), created);
    assert_eq!(market.extensions(), 0);
    assert!(second_report.rejected_workers.is_empty());
    assert_eq!(
        second_report.paragraphs[0].patches,
        first_report.paragraphs[0].patches
    );
}

#[tokio::test]
async fn fix_stage_tops_up_when_rewrites_are_unusable() {
    let market = Arc::new(ScriptedMarket::new());
    script_find(&market);
    // First three fix answers are copy-pastes; the usable rewrites only
    // arrive after the batch is extended.
    market.script_task(vec![
        (
            "w6".into(),
            AnswerForm::Rewrite {
                new_text: SENTENCE.into(),
                cuttable: Some(false),
            },
        ),
        (
            "w7".into(),
            AnswerForm::Rewrite {
                new_text: SENTENCE.into(),
                cuttable: Some(false),
            },
        ),
        (
            "w8".into(),
            AnswerForm::Rewrite {
                new_text: SENTENCE.into(),
                cuttable: Some(false),
            },
        ),
        (
            "w9".into(),
            AnswerForm::Rewrite {
                new_text: REWRITE.into(),
                cuttable: Some(true),
            },
        ),
        (
            "w10".into(),
            AnswerForm::Rewrite {
                new_text: "This is wordy indeed.".into(),
                cuttable: Some(false),
            },
        ),
    ]);
    // Two distinct rewrites, so no challenge option; voters strike the
    // second one down on meaning.
    market.script_task(vec![
        ("w11".into(), ballot(&[], &["This is wordy indeed."])),
        ("w12".into(), ballot(&[], &["This is wordy indeed."])),
        ("w13".into(), ballot(&[], &[])),
    ]);

    let document = Arc::new(StaticDocument::new(vec![PARAGRAPH.to_string()]));
    let pipeline = Pipeline::builder(market.clone(), document)
        .with_config(test_config())
        .build();
    let report = pipeline.run().await.unwrap();

    assert_eq!(market.extensions(), 1);
    assert!(report.suspended.is_empty());

    let patch = &report.paragraphs[0].patches[0];
    assert!(!patch.can_cut); // 1 of 5 cut votes
    assert_eq!(patch.num_editors, 5);
    assert_eq!(patch.options.len(), 1);
    assert_eq!(patch.options[0].edited_text, REWRITE);
    assert_eq!(patch.options[0].meaning_votes, 0);

    // All three copy-paste workers were flagged.
    let rejected: Vec<&str> = report
        .rejected_workers
        .iter()
        .map(|r| r.worker.as_str())
        .collect();
    assert!(rejected.contains(&"w6") && rejected.contains(&"w7") && rejected.contains(&"w8"));
}
