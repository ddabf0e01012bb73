// SPDX-License-Identifier: GPL-3.0-only

//! Fire-and-forget event reporting

use std::fmt;
use std::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryEvent {
    pub name: &'static str,
    pub fields: Vec<(&'static str, String)>,
}

impl TelemetryEvent {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.fields.push((key, value.into()));
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for TelemetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (key, value) in &self.fields {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

/// Receives events; implementations must not block the caller
pub trait EventReporter: Send + Sync + fmt::Debug {
    fn report(&self, event: TelemetryEvent);
}

/// Emits events as `tracing` records under the `telemetry` target
#[derive(Debug, Default)]
pub struct TracingReporter;

impl EventReporter for TracingReporter {
    fn report(&self, event: TelemetryEvent) {
        info!(target: "telemetry", event = event.name, details = %event, "Event reported");
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventReporter for RecordingReporter {
    fn report(&self, event: TelemetryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display() {
        let event = TelemetryEvent::new("register_custom_filter")
            .with_field("name", "Sepia")
            .with_field("formats", "RGBA8888");
        assert_eq!(
            event.to_string(),
            "register_custom_filter name=Sepia formats=RGBA8888"
        );
        assert_eq!(event.field("name"), Some("Sepia"));
    }

    #[test]
    fn test_recording_reporter() {
        let reporter = RecordingReporter::default();
        reporter.report(TelemetryEvent::new("a"));
        reporter.report(TelemetryEvent::new("b"));
        let names: Vec<_> = reporter.events().iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
