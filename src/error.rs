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

//! Transfer error taxonomy shared by all operations.

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug)]
pub enum TransferError {
    /// Opening the serial port was denied (device busy, permission, absent).
    PortUnavailable(String),
    /// The caller withdrew before the operation could begin.
    UserCancelled,
    /// Cooperative stop observed mid-operation. A normal exit path, not a fault.
    StopRequested,
    /// Token-based partial-send anchor absent from the program.
    StartPointNotFound(String),
    /// Resolved start index lies beyond the transfer window.
    RangeExceeded { start: usize, boundary: usize },
    /// Read/write failure during an active operation.
    Io(std::io::Error),
}

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferError::PortUnavailable(msg) => write!(f, "Serial port unavailable: {}", msg),
            TransferError::UserCancelled => write!(f, "Operation cancelled before start"),
            TransferError::StopRequested => write!(f, "Stop requested"),
            TransferError::StartPointNotFound(token) => {
                write!(f, "{} not found in the file. Cancelling operation.", token)
            }
            TransferError::RangeExceeded { start, boundary } => write!(
                f,
                "Starting point ({}) exceeds allowable range (up to {}).",
                start + 1,
                boundary + 1
            ),
            TransferError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        TransferError::Io(err)
    }
}

impl From<serialport::Error> for TransferError {
    fn from(err: serialport::Error) -> Self {
        TransferError::PortUnavailable(err.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
