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

use std::time::Duration;

use serialport::FlowControl;
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::TransferError;
use crate::event::{EventSink, TransferEvent};

/// Upper bound on a single blocking read; a stalled link cannot hang a poll
/// past this.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// SerialPort Trait
// ============================================================================

/// Trait for serial port operations needed by the transfer engines
pub trait SerialPort: Send {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize>;

    /// Count of inbound bytes currently buffered by the driver.
    fn bytes_to_read(&mut self) -> std::io::Result<u32>;
}

/// Read whatever is currently buffered, without blocking on an idle link.
/// Returns `None` when nothing is waiting.
pub fn read_available(port: &mut dyn SerialPort) -> std::io::Result<Option<Vec<u8>>> {
    let waiting = port.bytes_to_read()? as usize;
    if waiting == 0 {
        return Ok(None);
    }
    let mut buf = vec![0u8; waiting];
    let n = port.read_timeout(&mut buf, READ_TIMEOUT)?;
    buf.truncate(n);
    Ok(Some(buf))
}

// ============================================================================
// Port Reservation
// ============================================================================

/// Best-effort open-then-close to clear a stale exclusive lock left by a
/// crashed prior session. Advisory: every outcome is reported as an event and
/// swallowed, and the real open attempt always follows.
pub fn force_release(config: &SessionConfig, sink: &mut dyn EventSink) {
    match serialport::new(config.port.as_str(), config.baud).open() {
        Ok(port) => {
            drop(port);
            sink.emit(TransferEvent::info(format!("Force-closed {}.", config.port)));
        }
        Err(e) => {
            debug!("force release of {} failed: {}", config.port, e);
            sink.emit(TransferEvent::info(format!(
                "{} not active or accessible: {}",
                config.port, e
            )));
        }
    }
}

// ============================================================================
// Real Serial Port Implementation
// ============================================================================

/// Real serial port implementation that wraps the serialport crate
pub struct RealSerialPort {
    port: Box<dyn serialport::SerialPort>,
}

impl RealSerialPort {
    /// Open with the configured parameters. Driver-level flow control stays
    /// off: the engines must see the raw XON/XOFF octets themselves.
    pub fn open(config: &SessionConfig) -> Result<Self, TransferError> {
        let data_bits = config
            .to_serial_data_bits()
            .map_err(TransferError::PortUnavailable)?;
        let stop_bits = config
            .to_serial_stop_bits()
            .map_err(TransferError::PortUnavailable)?;
        let parity = config
            .parity
            .to_serial()
            .map_err(TransferError::PortUnavailable)?;

        let port = serialport::new(config.port.as_str(), config.baud)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()?;

        Ok(RealSerialPort { port })
    }
}

impl SerialPort for RealSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.port.write_all(buf)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        self.port.read(buf)
    }

    fn bytes_to_read(&mut self) -> std::io::Result<u32> {
        self.port
            .bytes_to_read()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

// ============================================================================
// Mock Serial Port for Testing
// ============================================================================

#[cfg(test)]
pub struct MockSerialPort {
    // Inbound schedule: each Some is one buffered burst, None is one poll
    // with nothing waiting.
    chunks: Vec<Option<Vec<u8>>>,
    pos: usize,
    // Track what was written
    write_log: Vec<u8>,
    // Expected writes for verification
    expected_writes: Vec<u8>,
    // Halting mid-stream (second terminator, stop token) legitimately leaves
    // bursts unread.
    allow_pending: bool,
}

#[cfg(test)]
impl MockSerialPort {
    pub fn new(chunks: Vec<Option<Vec<u8>>>, expected_writes: Vec<u8>) -> Self {
        MockSerialPort {
            chunks,
            pos: 0,
            write_log: Vec::new(),
            expected_writes,
            allow_pending: false,
        }
    }

    pub fn allow_pending(mut self) -> Self {
        self.allow_pending = true;
        self
    }
}

#[cfg(test)]
impl SerialPort for MockSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.write_log.extend_from_slice(buf);
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> std::io::Result<usize> {
        match self.chunks.get(self.pos) {
            Some(Some(chunk)) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                self.pos += 1;
                Ok(n)
            }
            _ => {
                self.pos += 1;
                Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "Mock timeout",
                ))
            }
        }
    }

    fn bytes_to_read(&mut self) -> std::io::Result<u32> {
        match self.chunks.get(self.pos) {
            Some(Some(chunk)) => Ok(chunk.len() as u32),
            Some(None) => {
                // One empty poll consumed.
                self.pos += 1;
                Ok(0)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
impl Drop for MockSerialPort {
    fn drop(&mut self) {
        if !self.allow_pending {
            assert_eq!(
                self.pos,
                self.chunks.len(),
                "MockSerialPort dropped with {} unconsumed bursts (consumed {} of {})",
                self.chunks.len() - self.pos,
                self.pos,
                self.chunks.len()
            );
        }

        assert_eq!(
            &self.write_log,
            &self.expected_writes,
            "MockSerialPort write log mismatch!\nExpected {} bytes:\n{:02X?}\nGot {} bytes:\n{:02X?}",
            self.expected_writes.len(),
            self.expected_writes,
            self.write_log.len(),
            self.write_log
        );
    }
}
