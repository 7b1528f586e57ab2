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

//! Session configuration: serial parameters and transfer options.
//!
//! Values live in a TOML file edited elsewhere; the engine only reads them.
//! Every field has a default so a partial file still loads, and a default
//! file is written on first run.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity, StopBits};

// ============================================================================
// Parity / Flow Control Labels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParityMode {
    None,
    Even,
    Odd,
    Mark,
    Space,
}

impl ParityMode {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.to_lowercase().as_str() {
            "none" => Ok(ParityMode::None),
            "even" => Ok(ParityMode::Even),
            "odd" => Ok(ParityMode::Odd),
            "mark" => Ok(ParityMode::Mark),
            "space" => Ok(ParityMode::Space),
            _ => Err(format!(
                "Invalid parity: {}. Must be 'none', 'even', 'odd', 'mark', or 'space'",
                value
            )),
        }
    }

    /// The serialport crate only implements none/odd/even; mark and space are
    /// accepted as configuration labels but cannot be opened.
    pub fn to_serial(self) -> Result<Parity, String> {
        match self {
            ParityMode::None => Ok(Parity::None),
            ParityMode::Even => Ok(Parity::Even),
            ParityMode::Odd => Ok(Parity::Odd),
            ParityMode::Mark | ParityMode::Space => Err(format!(
                "Parity {:?} is not supported by the serial driver",
                self
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControlMode {
    /// XON/XOFF pacing handled by the engine. The only implemented mode.
    Software,
    /// Accepted as a label; no behavior attached.
    Hardware,
}

impl FlowControlMode {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.to_lowercase().as_str() {
            "software" => Ok(FlowControlMode::Software),
            "hardware" => Ok(FlowControlMode::Hardware),
            _ => Err(format!(
                "Invalid flow control: {}. Must be 'software' or 'hardware'",
                value
            )),
        }
    }
}

// ============================================================================
// Session Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial port to use (e.g., /dev/ttyUSB0 or COM1)
    pub port: String,
    pub baud: u32,
    /// Data bits (5, 6, 7, or 8)
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    pub parity: ParityMode,
    pub flow_control: FlowControlMode,
    /// Hold transmission until the controller sends XON.
    pub wait_for_start: bool,
    /// Append transfer events to the datalog files.
    pub logging_enabled: bool,
    /// After a completed full send, await a fresh XON and send again.
    pub cycle_send: bool,
    /// Delay in milliseconds after each transmitted line.
    pub line_delay_ms: u64,
    /// Receive poll interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            port: "COM1".to_string(),
            baud: 9600,
            data_bits: 8,
            stop_bits: 2,
            parity: ParityMode::None,
            flow_control: FlowControlMode::Software,
            wait_for_start: true,
            logging_enabled: false,
            cycle_send: false,
            line_delay_ms: 100,
            poll_interval_ms: 100,
        }
    }
}

impl SessionConfig {
    /// Load the config file, or write and return the defaults when absent.
    pub fn load_or_create(path: &Path) -> Result<Self, String> {
        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
            toml::from_str(&raw).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
        } else {
            let config = SessionConfig::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| format!("Cannot serialize config: {}", e))?;
        std::fs::write(path, raw).map_err(|e| format!("Cannot write {}: {}", path.display(), e))
    }

    pub fn to_serial_data_bits(&self) -> Result<DataBits, String> {
        match self.data_bits {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            _ => Err(format!(
                "Invalid data bits: {}. Must be 5, 6, 7, or 8",
                self.data_bits
            )),
        }
    }

    pub fn to_serial_stop_bits(&self) -> Result<StopBits, String> {
        match self.stop_bits {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            _ => Err(format!(
                "Invalid stop bits: {}. Must be 1 or 2",
                self.stop_bits
            )),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
