//! Tracing layer feeding the host's log stream into the relay.
//!
//! Hooks the process-wide `tracing` pipeline: every event becomes a
//! [`LogRecord`] appended to the relay's ring buffer and forwarded over the
//! bridge while connected. The relay's own re-entrancy guard keeps a
//! forwarding failure from looping back through this layer.

use std::fmt;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use tether_bridge::LogRelay;
use tether_core::logs::{LogRecord, LogSeverity};

/// `tracing_subscriber::Layer` that mirrors events into a [`LogRelay`].
pub struct RelayLayer {
    relay: Arc<LogRelay>,
}

impl RelayLayer {
    /// Create a layer feeding the given relay.
    #[must_use]
    pub fn new(relay: Arc<LogRelay>) -> Self {
        Self { relay }
    }
}

impl<S: Subscriber> Layer<S> for RelayLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let severity = LogSeverity::from_tracing(event.metadata().level());
        let message = if visitor.message.is_empty() {
            event.metadata().name().to_owned()
        } else {
            visitor.message
        };
        let mut record = LogRecord::new(severity, message);
        if let Some(stack) = visitor.stack_trace {
            record = record.with_stack_trace(stack);
        }
        self.relay.record(record);
    }
}

/// Collects the `message` and `stack_trace` fields of an event.
#[derive(Default)]
struct RecordVisitor {
    message: String,
    stack_trace: Option<String>,
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_owned(),
            "stack_trace" => self.stack_trace = Some(value.to_owned()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "stack_trace" => self.stack_trace = Some(format!("{value:?}")),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt as _;

    use tether_bridge::MessageRouter;

    fn relay() -> Arc<LogRelay> {
        Arc::new(LogRelay::new(Arc::new(MessageRouter::new()), 100))
    }

    #[test]
    fn events_land_in_the_relay_buffer() {
        let relay = relay();
        let subscriber =
            tracing_subscriber::registry().with(RelayLayer::new(Arc::clone(&relay)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("scene loaded");
            tracing::error!(stack_trace = "at SceneLoader.load", "shader compile failed");
        });

        let records = relay.snapshot();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "scene loaded");
        assert_eq!(records[0].severity, LogSeverity::Info);
        assert_eq!(records[1].severity, LogSeverity::Error);
        assert_eq!(records[1].stack_trace.as_deref(), Some("at SceneLoader.load"));
    }

    #[test]
    fn field_values_are_interpolated_into_the_message() {
        let relay = relay();
        let subscriber =
            tracing_subscriber::registry().with(RelayLayer::new(Arc::clone(&relay)));

        tracing::subscriber::with_default(subscriber, || {
            let count = 3;
            tracing::warn!("dropped {count} frames");
        });

        assert_eq!(relay.snapshot()[0].message, "dropped 3 frames");
    }
}
