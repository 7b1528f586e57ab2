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

//! Software flow-control codes and transmit-permission tracking

/// Transmit on - controller is ready for more data
pub const XON: u8 = 0x11;

/// Transmit off - controller buffer is full, hold transmission
pub const XOFF: u8 = 0x13;

// ============================================================================
// Flow State
// ============================================================================

/// Transmit permission as last signalled by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Blocked,
    Ready,
}

// ============================================================================
// Flow Monitor
// ============================================================================

/// Scans inbound byte chunks for XON/XOFF and keeps the current [`FlowState`].
///
/// XOFF takes precedence: a chunk containing both codes leaves the state
/// Blocked regardless of byte order within the chunk.
pub struct FlowMonitor {
    state: FlowState,
}

impl FlowMonitor {
    pub fn new(initial: FlowState) -> Self {
        FlowMonitor { state: initial }
    }

    /// Scan one inbound chunk. Returns `Some(state)` when the chunk carried
    /// a flow-control code, `None` when it carried none.
    pub fn scan(&mut self, chunk: &[u8]) -> Option<FlowState> {
        if chunk.contains(&XOFF) {
            self.state = FlowState::Blocked;
            Some(FlowState::Blocked)
        } else if chunk.contains(&XON) {
            self.state = FlowState::Ready;
            Some(FlowState::Ready)
        } else {
            None
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == FlowState::Ready
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xoff_blocks() {
        let mut monitor = FlowMonitor::new(FlowState::Ready);
        assert_eq!(monitor.scan(&[b'G', b'0', XOFF]), Some(FlowState::Blocked));
        assert!(!monitor.is_ready());
    }

    #[test]
    fn test_xon_resumes() {
        let mut monitor = FlowMonitor::new(FlowState::Blocked);
        assert_eq!(monitor.scan(&[XON]), Some(FlowState::Ready));
        assert!(monitor.is_ready());
    }

    #[test]
    fn test_xoff_wins_over_xon_in_same_chunk() {
        // Scenario D: both codes in one chunk, either order, XOFF wins.
        let mut monitor = FlowMonitor::new(FlowState::Ready);
        assert_eq!(monitor.scan(&[XOFF, XON]), Some(FlowState::Blocked));
        assert!(!monitor.is_ready());

        let mut monitor = FlowMonitor::new(FlowState::Ready);
        assert_eq!(monitor.scan(&[XON, XOFF]), Some(FlowState::Blocked));
        assert!(!monitor.is_ready());
    }

    #[test]
    fn test_plain_data_leaves_state_untouched() {
        let mut monitor = FlowMonitor::new(FlowState::Blocked);
        assert_eq!(monitor.scan(b"G1 X10 Y20"), None);
        assert_eq!(monitor.state(), FlowState::Blocked);

        let mut monitor = FlowMonitor::new(FlowState::Ready);
        assert_eq!(monitor.scan(b""), None);
        assert!(monitor.is_ready());
    }
}
