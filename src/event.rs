// Copyright (C) 2026 The nclink developers
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Transfer event stream and the sinks that consume it.
//!
//! The engines never talk to a screen or a log file directly; they emit
//! [`TransferEvent`]s in chronological order to an [`EventSink`] chosen by
//! the caller.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::warn;

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Info,
    LineSent,
    LineReceived,
    Error,
}

/// One status record emitted by an operation.
#[derive(Debug, Clone)]
pub struct TransferEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub line: Option<usize>,
    pub text: String,
}

impl TransferEvent {
    fn new(kind: EventKind, line: Option<usize>, text: impl Into<String>) -> Self {
        TransferEvent {
            timestamp: Utc::now(),
            kind,
            line,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        TransferEvent::new(EventKind::Info, None, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        TransferEvent::new(EventKind::Error, None, text)
    }

    pub fn line_sent(line: usize, text: impl Into<String>) -> Self {
        TransferEvent::new(EventKind::LineSent, Some(line), text)
    }

    pub fn line_received(line: usize, text: impl Into<String>) -> Self {
        TransferEvent::new(EventKind::LineReceived, Some(line), text)
    }
}

impl std::fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.kind, self.line) {
            (EventKind::LineSent, Some(n)) => write!(f, "Line {}: Sent: {}", n, self.text),
            (EventKind::LineReceived, Some(n)) => write!(f, "Line {}: Received: {}", n, self.text),
            _ => write!(f, "{}", self.text),
        }
    }
}

// ============================================================================
// Sink Trait
// ============================================================================

/// Ordered consumer of transfer events. Implementations must tolerate being
/// driven from a worker thread.
pub trait EventSink: Send {
    fn emit(&mut self, event: TransferEvent);
}

// ============================================================================
// Stdout Sink
// ============================================================================

/// Prints each event message, one per line.
pub struct StdoutSink;

impl EventSink for StdoutSink {
    fn emit(&mut self, event: TransferEvent) {
        println!("{}", event);
    }
}

// ============================================================================
// Log File Sink
// ============================================================================

/// Appends `<ISO-8601 UTC timestamp> - <message>` per event to a log file.
///
/// A failed append is reported once through tracing and otherwise swallowed;
/// logging must never take down a running transfer.
pub struct LogFileSink {
    file: std::fs::File,
}

impl LogFileSink {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(LogFileSink { file })
    }
}

impl EventSink for LogFileSink {
    fn emit(&mut self, event: TransferEvent) {
        let stamp = event.timestamp.format("%Y-%m-%dT%H:%M:%SZ");
        if let Err(e) = writeln!(self.file, "{} - {}", stamp, event) {
            warn!("transfer log append failed: {}", e);
        }
    }
}

// ============================================================================
// Composite Sink
// ============================================================================

/// Fans each event out to every inner sink in order.
pub struct CompositeSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl CompositeSink {
    pub fn new(sinks: Vec<Box<dyn EventSink>>) -> Self {
        CompositeSink { sinks }
    }
}

impl EventSink for CompositeSink {
    fn emit(&mut self, event: TransferEvent) {
        for sink in &mut self.sinks {
            sink.emit(event.clone());
        }
    }
}

// ============================================================================
// Collect Sink
// ============================================================================

/// Buffers events behind a shared handle. Used by embedders that render the
/// stream themselves, and by the test suites.
#[derive(Clone, Default)]
pub struct CollectSink {
    events: Arc<Mutex<Vec<TransferEvent>>>,
}

impl CollectSink {
    pub fn new() -> Self {
        CollectSink::default()
    }

    pub fn snapshot(&self) -> Vec<TransferEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for CollectSink {
    fn emit(&mut self, event: TransferEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_messages() {
        assert_eq!(
            TransferEvent::line_sent(4, "G1 X1").to_string(),
            "Line 4: Sent: G1 X1"
        );
        assert_eq!(
            TransferEvent::line_received(2, "G90").to_string(),
            "Line 2: Received: G90"
        );
        assert_eq!(
            TransferEvent::info("Opened COM1 successfully.").to_string(),
            "Opened COM1 successfully."
        );
    }

    #[test]
    fn test_log_file_sink_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datalog_send.log");

        let mut sink = LogFileSink::open(&path).unwrap();
        sink.emit(TransferEvent::line_sent(1, "%"));
        sink.emit(TransferEvent::info("File sent successfully."));
        drop(sink);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        // 2026-08-06T12:34:56Z - Line 1: Sent: %
        assert!(lines[0].ends_with(" - Line 1: Sent: %"), "got: {}", lines[0]);
        assert!(lines[1].ends_with(" - File sent successfully."));
        let stamp = lines[0].split(" - ").next().unwrap();
        assert_eq!(stamp.len(), "2026-08-06T12:34:56Z".len());
        assert!(stamp.ends_with('Z'));
    }

    #[test]
    fn test_collect_sink_preserves_order() {
        let collect = CollectSink::new();
        let mut sink = collect.clone();
        sink.emit(TransferEvent::info("first"));
        sink.emit(TransferEvent::info("second"));

        let events = collect.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].text, "first");
        assert_eq!(events[1].text, "second");
        assert!(events[0].timestamp <= events[1].timestamp);
    }

    #[test]
    fn test_composite_fans_out() {
        let a = CollectSink::new();
        let b = CollectSink::new();
        let mut composite =
            CompositeSink::new(vec![Box::new(a.clone()), Box::new(b.clone())]);
        composite.emit(TransferEvent::error("boom"));

        assert_eq!(a.snapshot().len(), 1);
        assert_eq!(b.snapshot().len(), 1);
        assert_eq!(b.snapshot()[0].kind, EventKind::Error);
    }
}
