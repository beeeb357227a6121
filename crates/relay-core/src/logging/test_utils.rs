//! In-memory tracing capture for asserting on log output.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// Events recorded by [`capture_logs`], as `(level, message)` pairs.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl CapturedLogs {
    /// Whether an event at `level` has a message containing `needle`.
    pub fn has_event(&self, level: Level, needle: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|(l, message)| *l == level && message.contains(needle))
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            value.clone_into(&mut self.0);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.events.lock().push((*event.metadata().level(), visitor.0));
    }
}

/// Capture every event on the current thread until the guard drops.
///
/// Under `#[tokio::test]` (current-thread runtime) events from spawned tasks
/// land here too.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let guard = tracing_subscriber::registry()
        .with(logs.clone())
        .with(LevelFilter::TRACE)
        .set_default();
    (logs, guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_level_and_substring() {
        let (logs, _guard) = capture_logs();
        tracing::warn!(participant_id = 3_u64, "delivery failed");
        assert!(logs.has_event(Level::WARN, "delivery failed"));
        assert!(logs.has_event(Level::WARN, "delivery"));
        assert!(!logs.has_event(Level::INFO, "delivery failed"));
    }

    #[test]
    fn nothing_leaks_after_guard_drops() {
        let (logs, guard) = capture_logs();
        drop(guard);
        tracing::error!("after");
        assert!(!logs.has_event(Level::ERROR, "after"));
    }
}
