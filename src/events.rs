//! Progress events emitted while a run executes.
//!
//! The pipeline reports batch progress, stage completions, and worker
//! rejections through a small fan-out bus so a UI (or a test) can observe
//! a run without polling. Producers hold an [`EventSender`]; the
//! [`EventBus`] broadcasts to its sinks from a background task.

use std::io::{self, Result as IoResult, Write};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::{sync::oneshot, task};

use crate::types::Stage;

/// A structured progress event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A quorum batch's observed progress changed.
    BatchStatus {
        paragraph: usize,
        patch: Option<usize>,
        stage: Stage,
        completed: usize,
        needed: usize,
    },
    /// A stage finished for one paragraph or patch.
    StageComplete {
        paragraph: usize,
        patch: Option<usize>,
        stage: Stage,
        wait_millis: u64,
        cost: f64,
    },
    /// A worker's submission was rejected.
    WorkerRejected {
        worker: String,
        stage: Stage,
        reason: String,
    },
    /// A paragraph finished end to end.
    ParagraphComplete { paragraph: usize, patches: usize },
}

/// Cloneable handle producers use to emit events.
///
/// Emission is best effort: once the bus shuts down, events are dropped
/// silently rather than failing the pipeline.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: flume::Sender<Event>,
}

impl EventSender {
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// A sender whose events go nowhere, for runs without observers.
    pub fn disconnected() -> Self {
        let (tx, _rx) = flume::bounded(0);
        Self { tx }
    }
}

/// Output target that consumes structured events.
pub trait EventSink: Send + Sync {
    fn handle(&mut self, event: &Event) -> IoResult<()>;
}

/// Writes one JSON line per event to stdout.
#[derive(Default)]
pub struct StdOutSink;

impl EventSink for StdOutSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        let line = serde_json::to_string(event).map_err(io::Error::other)?;
        let mut out = io::stdout();
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()
    }
}

/// Captures events in memory for tests and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.entries.lock().expect("sink poisoned").clone()
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.entries.lock().expect("sink poisoned").push(event.clone());
        Ok(())
    }
}

struct ListenerState {
    shutdown: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}

/// Receives events and broadcasts them to every sink.
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    channel: (flume::Sender<Event>, flume::Receiver<Event>),
    listener: Mutex<Option<ListenerState>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink)
    }
}

impl EventBus {
    pub fn with_sink<S: EventSink + 'static>(sink: S) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(vec![Box::new(sink)])),
            channel: flume::unbounded(),
            listener: Mutex::new(None),
        }
    }

    pub fn add_sink<S: EventSink + 'static>(&self, sink: S) {
        self.sinks.lock().expect("sinks poisoned").push(Box::new(sink));
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.channel.0.clone(),
        }
    }

    /// Spawn the broadcast task. Idempotent.
    pub fn listen(&self) {
        let mut guard = self.listener.lock().expect("listener poisoned");
        if guard.is_some() {
            return;
        }
        let rx = self.channel.1.clone();
        let sinks = Arc::clone(&self.sinks);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    recv = rx.recv_async() => match recv {
                        Err(_) => break,
                        Ok(event) => {
                            let mut sinks = sinks.lock().expect("sinks poisoned");
                            for sink in sinks.iter_mut() {
                                if let Err(e) = sink.handle(&event) {
                                    tracing::warn!(error = %e, "event sink failed");
                                }
                            }
                        }
                    }
                }
            }
        });
        *guard = Some(ListenerState {
            shutdown: shutdown_tx,
            handle,
        });
    }

    /// Stop the broadcast task, waiting for queued events to flush.
    pub async fn stop(&self) {
        let state = self.listener.lock().expect("listener poisoned").take();
        if let Some(state) = state {
            // Drain whatever is already queued before shutting down.
            while let Ok(event) = self.channel.1.try_recv() {
                let mut sinks = self.sinks.lock().expect("sinks poisoned");
                for sink in sinks.iter_mut() {
                    let _ = sink.handle(&event);
                }
            }
            let _ = state.shutdown.send(());
            let _ = state.handle.await;
        }
    }
}
