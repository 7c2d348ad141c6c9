//! Bundled relay sinks.

use std::sync::Mutex;

use tracing::{debug, error, info, warn};

use super::{RelayEvent, RelayLevel, RelaySink};

/// Forwards relay events to the `tracing` macros, carrying the channel and
/// ref as fields.
pub struct TracingSink;

impl TracingSink {
    /// Create the sink.
    pub fn new() -> Self {
        Self
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RelaySink for TracingSink {
    fn sink_ref(&self) -> &str {
        "tracing"
    }

    fn consume(&self, event: &RelayEvent) {
        match event.level {
            RelayLevel::Debug => {
                debug!(channel = event.channel, reference = event.reference, "{}", event.message);
            }
            RelayLevel::Info => {
                info!(channel = event.channel, reference = event.reference, "{}", event.message);
            }
            RelayLevel::Warn => {
                warn!(channel = event.channel, reference = event.reference, "{}", event.message);
            }
            RelayLevel::Error | RelayLevel::Fatal => {
                error!(channel = event.channel, reference = event.reference, "{}", event.message);
            }
        }
    }
}

/// Buffers events in memory. Useful in tests and for GUI hosts that poll
/// for new events instead of subscribing.
pub struct MemorySink {
    reference: String,
    events: Mutex<Vec<RelayEvent>>,
}

impl MemorySink {
    /// Create a named memory sink.
    pub fn new(reference: impl Into<String>) -> Self {
        Self { reference: reference.into(), events: Mutex::new(Vec::new()) }
    }

    /// Snapshot the buffered events.
    pub fn events(&self) -> Vec<RelayEvent> {
        self.events.lock().expect("memory sink lock poisoned").clone()
    }

    /// Drop all buffered events.
    pub fn clear(&self) {
        self.events.lock().expect("memory sink lock poisoned").clear();
    }
}

impl RelaySink for MemorySink {
    fn sink_ref(&self) -> &str {
        &self.reference
    }

    fn consume(&self, event: &RelayEvent) {
        self.events.lock().expect("memory sink lock poisoned").push(event.clone());
    }
}
