//! Progress event sinks.
//!
//! The engine emits [`Event`]s synchronously from its single control thread,
//! so delivery order always equals production order. Sinks never block the
//! engine on a missing observer: a detached channel or a failing writer only
//! produces a tracing warning.

use std::io::Write;
use std::sync::Mutex;
use std::sync::mpsc::Sender;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::types::{StepStatus, StreamKind};

/// Structured progress event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    StepStatusChanged { index: usize, status: StepStatus },
    LogLine { stream: StreamKind, text: String },
    Info { text: String },
    OverallSucceeded { message: String },
    OverallFailed { error: String },
}

impl Event {
    pub fn info(text: impl Into<String>) -> Self {
        Event::Info { text: text.into() }
    }

    pub fn log(stream: StreamKind, text: impl Into<String>) -> Self {
        Event::LogLine {
            stream,
            text: text.into(),
        }
    }

    pub fn is_overall(&self) -> bool {
        matches!(
            self,
            Event::OverallSucceeded { .. } | Event::OverallFailed { .. }
        )
    }
}

/// Ordered event sink.
pub trait Notifier {
    fn notify(&self, event: Event);
}

impl<N: Notifier + ?Sized> Notifier for &N {
    fn notify(&self, event: Event) {
        (**self).notify(event);
    }
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify(&self, event: Event) {
        (**self).notify(event);
    }
}

/// Sink used when no observer is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: Event) {}
}

/// Forwards events over an `mpsc` channel to an observer on another thread.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: Sender<Event>,
}

impl ChannelNotifier {
    pub fn new(tx: Sender<Event>) -> Self {
        Self { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: Event) {
        if self.tx.send(event).is_err() {
            debug!("event receiver dropped; discarding event");
        }
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesNotifier<W: Write> {
    writer: Mutex<W>,
}

impl<W: Write> JsonLinesNotifier<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write> Notifier for JsonLinesNotifier<W> {
    fn notify(&self, event: Event) {
        let mut line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(err) => {
                warn!(err = %err, "failed to serialize event");
                return;
            }
        };
        line.push('\n');
        let Ok(mut writer) = self.writer.lock() else {
            warn!("event writer lock poisoned");
            return;
        };
        if let Err(err) = writer.write_all(line.as_bytes()) {
            warn!(err = %err, "failed to write event");
        } else if let Err(err) = writer.flush() {
            warn!(err = %err, "failed to flush event writer");
        }
    }
}

/// Delivers every event to each sink in registration order.
#[derive(Default)]
pub struct FanOutNotifier<'a> {
    sinks: Vec<Box<dyn Notifier + 'a>>,
}

impl<'a> FanOutNotifier<'a> {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with(mut self, sink: impl Notifier + 'a) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl Notifier for FanOutNotifier<'_> {
    fn notify(&self, event: Event) {
        for sink in &self.sinks {
            sink.notify(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn json_lines_are_tagged_by_type() {
        let sink = JsonLinesNotifier::new(Vec::new());
        sink.notify(Event::StepStatusChanged {
            index: 2,
            status: StepStatus::Running,
        });
        sink.notify(Event::log(StreamKind::Stderr, "boom\n"));
        let out = String::from_utf8(sink.into_inner()).expect("utf8");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines[0],
            r#"{"type":"step_status_changed","index":2,"status":"Running"}"#
        );
        assert_eq!(
            lines[1],
            r#"{"type":"log_line","stream":"stderr","text":"boom\n"}"#
        );
    }

    #[test]
    fn channel_notifier_tolerates_detached_observer() {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelNotifier::new(tx);
        sink.notify(Event::info("first"));
        assert_eq!(rx.recv().expect("recv"), Event::info("first"));
        drop(rx);
        sink.notify(Event::info("nobody listening"));
    }

    #[test]
    fn fan_out_preserves_order_for_each_sink() {
        let (tx_a, rx_a) = mpsc::channel();
        let (tx_b, rx_b) = mpsc::channel();
        let fan = FanOutNotifier::new()
            .with(ChannelNotifier::new(tx_a))
            .with(ChannelNotifier::new(tx_b));
        fan.notify(Event::info("one"));
        fan.notify(Event::OverallSucceeded {
            message: "done".to_string(),
        });
        drop(fan);
        for rx in [rx_a, rx_b] {
            let events: Vec<Event> = rx.iter().collect();
            assert_eq!(events.len(), 2);
            assert!(events[1].is_overall());
        }
    }
}
