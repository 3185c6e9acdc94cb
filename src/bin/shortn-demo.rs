//! Offline demonstration run against a scripted market.
//!
//! Walks one paragraph through Find, Fix, and Verify with canned worker
//! answers and prints the resulting patch options and length plan.

use std::sync::Arc;

use miette::IntoDiagnostic;

use shortn::config::{PipelineConfig, StageConfig};
use shortn::document::StaticDocument;
use shortn::events::{EventBus, StdOutSink};
use shortn::market::{AnswerForm, ScriptedMarket};
use shortn::patch::Span;
use shortn::runtime::Pipeline;

const PARAGRAPH: &str =
    "Our team met on Tuesday. The meeting was in actual fact quite long and rather boring. \
     We still shipped on time.";

#[tokio::main]
async fn main() -> miette::Result<()> {
    shortn::telemetry::init();

    let market = Arc::new(ScriptedMarket::new());
    // Find: three of five workers agree on the middle sentence.
    market.script_task(vec![
        ("finder-1".into(), spans(&[(25, 85)])),
        ("finder-2".into(), spans(&[(25, 85)])),
        ("finder-3".into(), spans(&[(29, 60)])),
        ("finder-4".into(), spans(&[])),
        ("finder-5".into(), spans(&[(90, 100)])),
    ]);
    // Fix: two rewrites plus cuttability votes.
    market.script_task(vec![
        (
            "fixer-1".into(),
            AnswerForm::Rewrite {
                new_text: "The meeting was long and boring.".into(),
                cuttable: Some(true),
            },
        ),
        (
            "fixer-2".into(),
            AnswerForm::Rewrite {
                new_text: "The meeting was quite long.".into(),
                cuttable: Some(true),
            },
        ),
        (
            "fixer-3".into(),
            AnswerForm::Rewrite {
                new_text: "The meeting dragged.".into(),
                cuttable: Some(false),
            },
        ),
    ]);
    // Verify: one rewrite draws meaning objections and is dropped.
    market.script_task(vec![
        ("voter-1".into(), votes(&[], &["The meeting dragged."])),
        ("voter-2".into(), votes(&[], &["The meeting dragged."])),
        ("voter-3".into(), votes(&[], &[])),
    ]);

    let bus = EventBus::with_sink(StdOutSink);
    bus.listen();

    let config = PipelineConfig {
        buffer_redundancy: 0,
        wait_time_ms: 500,
        poll_interval_ms: 10,
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
    };

    let document = Arc::new(StaticDocument::new(vec![PARAGRAPH.to_string()]));
    let pipeline = Pipeline::builder(market, document)
        .with_config(config)
        .with_events(bus.sender())
        .build();
    let report = pipeline.run().await.into_diagnostic()?;
    bus.stop().await;

    for result in &report.paragraphs {
        println!("\nparagraph {}:", result.paragraph);
        for patch in &result.patches {
            println!(
                "  patch [{}, {}) can_cut={} original={:?}",
                patch.edit_start, patch.edit_end, patch.can_cut, patch.original_text
            );
            for option in &patch.options {
                println!(
                    "    option ({} voters): {:?}",
                    option.num_voters, option.edited_text
                );
            }
        }
        println!("  achievable lengths: {:?}", result.plan.possible_lengths());
        if let Some(selection) = result.plan.select(40) {
            println!("  closest to 40 chars: {}", selection.total_length);
        }
    }
    println!(
        "\ntotal cost: {:.2}, total wait: {}ms",
        report.timing.total_cost, report.timing.total_wait_millis
    );
    Ok(())
}

fn spans(pairs: &[(usize, usize)]) -> AnswerForm {
    AnswerForm::Spans {
        spans: pairs.iter().map(|&(s, e)| Span::new(s, e)).collect(),
    }
}

fn votes(grammar: &[&str], meaning: &[&str]) -> AnswerForm {
    AnswerForm::Votes {
        grammar: Some(grammar.iter().map(|s| s.to_string()).collect()),
        meaning: Some(meaning.iter().map(|s| s.to_string()).collect()),
    }
}
