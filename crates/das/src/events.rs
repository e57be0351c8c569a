use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::DASError;

/// Kind of a structured simulation event, serialized as its integer code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EventCode {
    HeaderSent = 0,
    HeaderReceived = 1,
    SamplingFinished = 2,
}

impl From<EventCode> for u8 {
    fn from(code: EventCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for EventCode {
    type Error = DASError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventCode::HeaderSent),
            1 => Ok(EventCode::HeaderReceived),
            2 => Ok(EventCode::SamplingFinished),
            other => Err(DASError::InvalidEventCode(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub timestamp: String,
    pub event_type: EventCode,
    pub block_id: u64,
}

impl LogEvent {
    pub fn now(event_type: EventCode, block_id: u64) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            event_type,
            block_id,
        }
    }

    /// JSON form of the event; serialization failures are logged and yield `None`
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(line) => Some(line),
            Err(e) => {
                warn!("Error marshaling event {:?}: {}", self.event_type, e);
                None
            }
        }
    }
}

/// Receiver of simulation events
///
/// Recording never fails from the caller's point of view.
pub trait EventSink: Send + Sync {
    fn record(&self, event: LogEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn record(&self, _event: LogEvent) {}
}

/// Emits each event as a JSON line on the `das::events` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: LogEvent) {
        if let Some(line) = event.to_json() {
            info!(target: "das::events", "{}", line);
        }
    }
}

/// Appends each event as one JSON line to a writer
pub struct JsonLinesEventSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesEventSink {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Open `path` for appending, creating it if needed
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl EventSink for JsonLinesEventSink {
    fn record(&self, event: LogEvent) {
        let Some(line) = event.to_json() else {
            return;
        };

        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            warn!("Failed to write event log line: {}", e);
        }
    }
}

/// Keeps events in memory, for inspection after a run
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for RecordingEventSink {
    fn record(&self, event: LogEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
