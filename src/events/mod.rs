//! The relay: an in-process event bus fanning structured events to sinks.
//!
//! Subsystems publish [`RelayEvent`]s carrying a channel (which subsystem),
//! a ref (which event within it), a severity, and a JSON payload. The relay
//! dispatches each event to every registered [`RelaySink`] in registration
//! order. `fatal` drains all sinks and then terminates the process - hosts
//! that need different fatal behaviour must not use `fatal`.
//!
//! Two sinks ship with the crate: [`TracingSink`] bridges events into the
//! `tracing` macros, and [`MemorySink`] buffers them for tests and GUI
//! consumers that poll.

mod sinks;


use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use sinks::{MemorySink, TracingSink};

/// Event severity, in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayLevel {
    /// Diagnostic detail.
    Debug,
    /// Routine progress.
    Info,
    /// Something recoverable went wrong.
    Warn,
    /// An operation failed.
    Error,
    /// Unrecoverable; the process exits after sinks drain.
    Fatal,
}

/// A structured event flowing through the relay.
#[derive(Debug, Clone, Serialize)]
pub struct RelayEvent {
    /// Originating subsystem (`net`, `updater`, `releaser`, ...).
    pub channel: &'static str,
    /// Event identifier within the channel (`net.download`, ...).
    pub reference: &'static str,
    /// Severity assigned by the publisher.
    pub level: RelayLevel,
    /// Event creation time.
    pub timestamp: DateTime<Utc>,
    /// Human-readable message.
    pub message: String,
    /// Structured payload, JSON-encoded by the publisher.
    pub data: serde_json::Value,
}

impl RelayEvent {
    /// Build an event with the current timestamp and an empty payload.
    pub fn new(channel: &'static str, reference: &'static str, message: impl Into<String>) -> Self {
        Self {
            channel,
            reference,
            level: RelayLevel::Info,
            timestamp: Utc::now(),
            message: message.into(),
            data: serde_json::Value::Null,
        }
    }

    /// Attach a serialisable payload. Serialization failures degrade to a
    /// null payload rather than dropping the event.
    pub fn with_data<T: Serialize>(mut self, data: &T) -> Self {
        self.data = serde_json::to_value(data).unwrap_or(serde_json::Value::Null);
        self
    }
}

/// A consumer of relay events.
pub trait RelaySink: Send + Sync {
    /// Identifier used when registering and deregistering.
    fn sink_ref(&self) -> &str;
    /// Receive one event. Called for every severity.
    fn consume(&self, event: &RelayEvent);
}

/// The event bus. Cheap to share behind an `Arc`; publishing locks the sink
/// list only for the duration of the fan-out.
pub struct Relay {
    sinks: RwLock<Vec<Box<dyn RelaySink>>>,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay {
    /// An empty relay with no sinks.
    pub fn new() -> Self {
        Self { sinks: RwLock::new(Vec::new()) }
    }

    /// A relay with the [`TracingSink`] pre-registered.
    pub fn with_tracing() -> Self {
        let relay = Self::new();
        relay.register_sink(Box::new(TracingSink::new()));
        relay
    }

    /// Register a sink. Sinks receive events in registration order.
    pub fn register_sink(&self, sink: Box<dyn RelaySink>) {
        self.sinks.write().expect("relay sink lock poisoned").push(sink);
    }

    /// Remove a sink by its ref.
    pub fn deregister_sink(&self, sink_ref: &str) {
        self.sinks
            .write()
            .expect("relay sink lock poisoned")
            .retain(|s| s.sink_ref() != sink_ref);
    }

    fn emit(&self, level: RelayLevel, mut event: RelayEvent) {
        event.level = level;
        {
            let sinks = self.sinks.read().expect("relay sink lock poisoned");
            for sink in sinks.iter() {
                sink.consume(&event);
            }
        }
        // Sinks have drained; a fatal event ends the process.
        if level == RelayLevel::Fatal {
            std::process::exit(1);
        }
    }

    /// Publish at debug severity.
    pub fn debug(&self, event: RelayEvent) {
        self.emit(RelayLevel::Debug, event);
    }

    /// Publish at info severity.
    pub fn info(&self, event: RelayEvent) {
        self.emit(RelayLevel::Info, event);
    }

    /// Publish at warn severity.
    pub fn warn(&self, event: RelayEvent) {
        self.emit(RelayLevel::Warn, event);
    }

    /// Publish at error severity.
    pub fn error(&self, event: RelayEvent) {
        self.emit(RelayLevel::Error, event);
    }

    /// Publish at fatal severity, then exit the process.
    pub fn fatal(&self, event: RelayEvent) {
        self.emit(RelayLevel::Fatal, event);
    }
}
