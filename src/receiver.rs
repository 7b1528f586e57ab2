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

//! Inbound capture: poll the link, persist what arrives, stop at the second
//! program terminator.

use std::io::Write;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::config::SessionConfig;
use crate::controller::StopToken;
use crate::error::TransferError;
use crate::event::{EventSink, TransferEvent};
use crate::program::TERMINATOR;
use crate::serial::{SerialPort, read_available};

// ============================================================================
// Receive Engine
// ============================================================================

pub struct ReceiveEngine<'a> {
    serial: Box<dyn SerialPort>,
    config: &'a SessionConfig,
    stop: StopToken,
    sink: &'a mut dyn EventSink,
}

impl<'a> ReceiveEngine<'a> {
    pub fn new(
        serial: Box<dyn SerialPort>,
        config: &'a SessionConfig,
        stop: StopToken,
        sink: &'a mut dyn EventSink,
    ) -> Self {
        ReceiveEngine {
            serial,
            config,
            stop,
            sink,
        }
    }

    /// Capture until the second standalone `%` line. Each polled chunk is
    /// filtered, appended to the destination and flushed before the chunk
    /// (not the whole capture) is split on CR into logical lines.
    pub fn run(mut self, dest: &mut dyn Write) -> Result<(), TransferError> {
        let mut line_number = 0usize;
        let mut terminator_count = 0u32;

        loop {
            if self.stop.is_set() {
                return Err(TransferError::StopRequested);
            }

            if let Some(chunk) = read_available(self.serial.as_mut())? {
                let decoded = String::from_utf8_lossy(&chunk);
                let filtered = sanitize(&decoded);
                debug!("chunk: {} bytes in, {} kept", chunk.len(), filtered.len());

                dest.write_all(filtered.as_bytes())?;
                dest.flush()?;

                for segment in filtered.split('\r') {
                    line_number += 1;
                    let trimmed = segment.trim();
                    if !trimmed.is_empty() {
                        self.sink
                            .emit(TransferEvent::line_received(line_number, trimmed));
                    }
                    if trimmed == TERMINATOR {
                        terminator_count += 1;
                        if terminator_count == 2 {
                            // End of program; trailing segments of this chunk
                            // are already on disk but are not processed.
                            self.sink.emit(TransferEvent::info(
                                "Second '%' detected. Closing port and saving file.",
                            ));
                            return Ok(());
                        }
                    }
                }
            }

            thread::sleep(Duration::from_millis(self.config.poll_interval_ms));
        }
    }
}

/// Keep carriage returns and printable characters. Control codes and the
/// replacement characters standing in for undecodable bytes are dropped.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|&c| c == '\r' || (!c.is_control() && c != '\u{FFFD}'))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
