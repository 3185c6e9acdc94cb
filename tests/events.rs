//! Event bus fan-out.

use shortn::events::{Event, EventBus, MemorySink};
use shortn::types::Stage;

#[tokio::test]
async fn emitted_events_reach_every_sink() {
    let sink_a = MemorySink::new();
    let sink_b = MemorySink::new();
    let bus = EventBus::with_sink(sink_a.clone());
    bus.add_sink(sink_b.clone());
    bus.listen();

    let sender = bus.sender();
    sender.emit(Event::BatchStatus {
        paragraph: 0,
        patch: None,
        stage: Stage::Find,
        completed: 2,
        needed: 5,
    });
    sender.emit(Event::ParagraphComplete {
        paragraph: 0,
        patches: 1,
    });
    // Give the listener a beat so delivery order is stable.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    bus.stop().await;

    let seen = sink_a.snapshot();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen, sink_b.snapshot());
    assert!(matches!(seen[1], Event::ParagraphComplete { patches: 1, .. }));
}

#[tokio::test]
async fn disconnected_sender_drops_events_silently() {
    let sender = shortn::events::EventSender::disconnected();
    sender.emit(Event::ParagraphComplete {
        paragraph: 3,
        patches: 0,
    });
}

#[test]
fn events_serialize_with_stable_tags() {
    let event = Event::WorkerRejected {
        worker: "w1".into(),
        stage: Stage::Fix,
        reason: "too long".into(),
    };
    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains("\"type\":\"worker_rejected\""));
    assert!(json.contains("\"stage\":\"fix\""));
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}
