//! Log capture for verifier tests.
//!
//! A `tracing-subscriber` layer keeps the level, message and the
//! `stage`/`version`/`detail` fields of every event so tests can assert
//! what a verification run logged.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{
    Event,
    Level,
    Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{
    Registry,
    layer::{Context, Layer, SubscriberExt},
};

/// Event emitted during a captured run.
#[derive(Debug)]
pub(crate) struct RecordedEvent {
    pub(crate) level: Level,
    pub(crate) message: Option<String>,
    pub(crate) stage: Option<String>,
    pub(crate) version: Option<String>,
    pub(crate) detail: Option<String>,
}

impl RecordedEvent {
    const fn new(level: Level) -> Self {
        Self {
            level,
            message: None,
            stage: None,
            version: None,
            detail: None,
        }
    }

    fn store(&mut self, field: &Field, value: String) {
        let slot = match field.name() {
            "message" => &mut self.message,
            "stage" => &mut self.stage,
            "version" => &mut self.version,
            "detail" => &mut self.detail,
            _ => return,
        };
        *slot = Some(value);
    }
}

impl Visit for RecordedEvent {
    fn record_str(&mut self, field: &Field, value: &str) { self.store(field, value.to_owned()); }

    // `%value` fields and formatted messages arrive here already rendered.
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.store(field, format!("{value:?}"));
    }
}

type Sink = Arc<Mutex<Vec<RecordedEvent>>>;

struct CaptureLayer {
    events: Sink,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorded = RecordedEvent::new(*event.metadata().level());
        event.record(&mut recorded);
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(recorded);
    }
}

/// Run `f` with a capturing subscriber installed on this thread.
///
/// Async code must be driven on the calling thread, e.g. through a
/// current-thread runtime's `block_on`; tasks it spawns there are captured
/// too.
pub(crate) fn capture_events<T>(f: impl FnOnce() -> T) -> (T, Vec<RecordedEvent>) {
    let events = Sink::default();
    let subscriber = Registry::default().with(CaptureLayer {
        events: Arc::clone(&events),
    });
    let value = tracing::subscriber::with_default(subscriber, f);
    let captured = std::mem::take(&mut *events.lock().unwrap_or_else(PoisonError::into_inner));
    (value, captured)
}
