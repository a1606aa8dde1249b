//! Firehose events as seen by the relay.
//!
//! An [`Event`] keeps the exact bytes it was received as, next to the decoded
//! envelope. Filtering reads the envelope; forwarding writes the bytes. The
//! relay therefore never re-serializes an event, and nothing it does can
//! alter the payload.

use bytes::Bytes;
use prost::Message;

use nozzle_proto::events::Envelope;
use nozzle_proto::events::envelope::EventType;

use crate::error::Result;

/// Closed set of event kinds carried on the firehose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    HttpStartStop,
    LogMessage,
    ValueMetric,
    CounterEvent,
    Error,
    ContainerMetric,
    /// Missing or unrecognised `eventType` tag.
    Unknown,
}

impl EventKind {
    fn from_tag(tag: i32) -> Self {
        match EventType::try_from(tag) {
            Ok(EventType::HttpStartStop) => Self::HttpStartStop,
            Ok(EventType::LogMessage) => Self::LogMessage,
            Ok(EventType::ValueMetric) => Self::ValueMetric,
            Ok(EventType::CounterEvent) => Self::CounterEvent,
            Ok(EventType::Error) => Self::Error,
            Ok(EventType::ContainerMetric) => Self::ContainerMetric,
            Err(_) => Self::Unknown,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HttpStartStop => "http_start_stop",
            Self::LogMessage => "log_message",
            Self::ValueMetric => "value_metric",
            Self::CounterEvent => "counter_event",
            Self::Error => "error",
            Self::ContainerMetric => "container_metric",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable firehose event.
#[derive(Debug, Clone)]
pub struct Event {
    wire: Bytes,
    envelope: Envelope,
    kind: EventKind,
}

impl Event {
    /// Decode an event from its binary wire form.
    pub fn decode(wire: Bytes) -> Result<Self> {
        let envelope = Envelope::decode(wire.clone())?;
        Ok(Self::with_parts(wire, envelope))
    }

    /// Build an event from an envelope constructed in-process.
    pub fn from_envelope(envelope: Envelope) -> Self {
        let wire = Bytes::from(envelope.encode_to_vec());
        Self::with_parts(wire, envelope)
    }

    fn with_parts(wire: Bytes, envelope: Envelope) -> Self {
        let kind = EventKind::from_tag(envelope.event_type);
        Self {
            wire,
            envelope,
            kind,
        }
    }

    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Name of the emitting component, empty when absent.
    pub fn origin(&self) -> &str {
        &self.envelope.origin
    }

    /// Metric name of a value-metric event; empty for every other kind or
    /// when the name is missing.
    pub fn metric_name(&self) -> &str {
        if self.kind != EventKind::ValueMetric {
            return "";
        }
        self.envelope
            .value_metric
            .as_ref()
            .map_or("", |m| m.name.as_str())
    }

    /// Canonical binary form written downstream.
    pub const fn wire_bytes(&self) -> &Bytes {
        &self.wire
    }

    pub fn into_wire_bytes(self) -> Bytes {
        self.wire
    }
}
