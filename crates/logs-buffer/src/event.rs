// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log events and the batches they are grouped into.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A single log line with its timestamp in Unix milliseconds.
///
/// Serializes with the field names of the remote API's `InputLogEvent`, so
/// the same representation is used on the wire and in spill files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    message: String,
    #[serde(rename = "timestamp")]
    timestamp_millis: i64,
}

impl LogEvent {
    /// Creates an event stamped with the current wall clock.
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_timestamp(message, now_millis())
    }

    /// Creates an event with an explicit timestamp, e.g. when replaying spilled events.
    pub fn with_timestamp(message: impl Into<String>, timestamp_millis: i64) -> Self {
        LogEvent {
            message: message.into(),
            timestamp_millis,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp_millis
    }

    /// Size of the message in UTF-8 bytes. Timestamps are not counted.
    pub fn message_bytes(&self) -> usize {
        self.message.len()
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// An ordered group of events submitted together in one append call.
///
/// `byte_size` tracks the charged size of the batch: message bytes plus the
/// per-event overhead the owning buffer was configured with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    events: Vec<LogEvent>,
    byte_size: usize,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, event: LogEvent, charged_bytes: usize) {
        self.byte_size += charged_bytes;
        self.events.push(event);
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<LogEvent> {
        self.events
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn count(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_defaults_to_current_time() {
        let before = now_millis();
        let event = LogEvent::new("hello");
        let after = now_millis();

        assert!(event.timestamp_millis() >= before);
        assert!(event.timestamp_millis() <= after);
        assert_eq!(event.message(), "hello");
    }

    #[test]
    fn test_event_keeps_explicit_timestamp() {
        let event = LogEvent::with_timestamp("replayed", 1_656_581_409_000);

        assert_eq!(event.timestamp_millis(), 1_656_581_409_000);
    }

    #[test]
    fn test_message_bytes_counts_utf8() {
        let event = LogEvent::with_timestamp("héllo", 0);

        assert_eq!(event.message_bytes(), 6);
    }

    #[test]
    fn test_event_serializes_with_api_field_names() {
        let event = LogEvent::with_timestamp("AAA", 42);

        let json = serde_json::to_string(&event).unwrap();

        assert_eq!(json, r#"{"message":"AAA","timestamp":42}"#);
    }

    #[test]
    fn test_batch_accumulates_size_and_count() {
        let mut batch = Batch::new();
        batch.push(LogEvent::with_timestamp("AAA", 1), 3);
        batch.push(LogEvent::with_timestamp("BBBB", 2), 4 + 26);

        assert_eq!(batch.count(), 2);
        assert_eq!(batch.byte_size(), 33);
        assert_eq!(batch.events()[1].message(), "BBBB");
    }
}
