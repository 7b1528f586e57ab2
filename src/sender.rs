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

//! Outbound drip-feed: full and partial program transmission under XON/XOFF.

use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::config::SessionConfig;
use crate::controller::StopToken;
use crate::error::TransferError;
use crate::event::{EventSink, TransferEvent};
use crate::flow::{FlowMonitor, FlowState};
use crate::program::{Program, StartPoint, TransferWindow};
use crate::serial::{SerialPort, read_available};

/// Poll granularity while waiting for the initial start signal.
const START_POLL: Duration = Duration::from_millis(10);

// ============================================================================
// Send Engine
// ============================================================================

pub struct SendEngine<'a> {
    serial: Box<dyn SerialPort>,
    config: &'a SessionConfig,
    program: &'a Program,
    stop: StopToken,
    sink: &'a mut dyn EventSink,
    monitor: FlowMonitor,
}

impl<'a> SendEngine<'a> {
    pub fn new(
        serial: Box<dyn SerialPort>,
        config: &'a SessionConfig,
        program: &'a Program,
        stop: StopToken,
        sink: &'a mut dyn EventSink,
    ) -> Self {
        let initial = if config.wait_for_start {
            FlowState::Blocked
        } else {
            FlowState::Ready
        };
        SendEngine {
            serial,
            config,
            program,
            stop,
            sink,
            monitor: FlowMonitor::new(initial),
        }
    }

    /// Full send: every line through end-of-file. A second terminator is not
    /// a cutoff here; only partial send windows on it.
    pub fn run_full(mut self) -> Result<(), TransferError> {
        if self.config.wait_for_start {
            self.sink
                .emit(TransferEvent::info("Waiting for XON to start transmission..."));
            self.await_ready()?;
        } else {
            self.sink.emit(TransferEvent::info("No XON required by settings."));
        }

        loop {
            self.stream(self.program.full_window())?;
            self.sink.emit(TransferEvent::info("File sent successfully."));

            if !self.config.cycle_send {
                return Ok(());
            }
            self.sink.emit(TransferEvent::info(
                "Cycle send enabled; awaiting start signal for next pass.",
            ));
            // A fresh pass re-arms only on a fresh XON.
            self.monitor = FlowMonitor::new(FlowState::Blocked);
            self.await_ready()?;
        }
    }

    /// Partial send from a line number or block-number token, confined to the
    /// window ending at the second terminator.
    pub fn run_partial(mut self, start: &StartPoint) -> Result<(), TransferError> {
        self.sink.emit(TransferEvent::info(format!(
            "Maximum line allowed for transmission: {} (before second '%')",
            self.program.boundary_index() + 1
        )));

        let window = self.program.partial_window(start)?;
        self.sink.emit(TransferEvent::info(format!(
            "Starting transmission from line {}.",
            window.start + 1
        )));

        if self.config.wait_for_start {
            self.sink
                .emit(TransferEvent::info("Waiting for XON to start transmission..."));
            self.await_ready()?;
        }

        self.stream(window)?;
        self.sink
            .emit(TransferEvent::info("Partial file transmission completed."));
        Ok(())
    }

    /// Tight poll until the controller signals Ready. Cancellation is
    /// observed here at the same granularity as the poll.
    fn await_ready(&mut self) -> Result<(), TransferError> {
        loop {
            if self.stop.is_set() {
                return Err(TransferError::StopRequested);
            }
            while let Some(chunk) = read_available(self.serial.as_mut())? {
                match self.monitor.scan(&chunk) {
                    Some(FlowState::Ready) => {
                        self.sink
                            .emit(TransferEvent::info("Received XON, starting transmission."));
                        return Ok(());
                    }
                    Some(FlowState::Blocked) => {
                        self.sink
                            .emit(TransferEvent::info("Received XOFF, waiting for XON..."));
                    }
                    None => {}
                }
            }
            thread::sleep(START_POLL);
        }
    }

    /// The paced per-line loop shared by full and partial send. Line numbers
    /// are reported by absolute position in the program.
    fn stream(&mut self, window: TransferWindow) -> Result<(), TransferError> {
        if self.program.is_empty() {
            return Ok(());
        }

        for index in window.start..=window.end {
            if self.stop.is_set() {
                return Err(TransferError::StopRequested);
            }

            self.drain_flow_signals()?;

            if self.monitor.is_ready() {
                let line = self.program.line(index).trim();
                if !line.is_empty() {
                    let payload = format!("{}\r\n", line);
                    self.serial.write_all(payload.as_bytes())?;
                    debug!("line {}: {} bytes written", index + 1, payload.len());
                    self.sink.emit(TransferEvent::line_sent(index + 1, line));
                }
            }

            thread::sleep(Duration::from_millis(self.config.line_delay_ms));
        }
        Ok(())
    }

    /// Scan everything currently buffered for XON/XOFF before a write.
    fn drain_flow_signals(&mut self) -> Result<(), TransferError> {
        while let Some(chunk) = read_available(self.serial.as_mut())? {
            match self.monitor.scan(&chunk) {
                Some(FlowState::Blocked) => {
                    self.sink
                        .emit(TransferEvent::info("Received XOFF, pausing transmission..."));
                }
                Some(FlowState::Ready) => {
                    self.sink
                        .emit(TransferEvent::info("Received XON, resuming transmission."));
                }
                None => {}
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CollectSink, EventKind};
    use crate::flow::{XOFF, XON};
    use crate::serial::MockSerialPort;

    fn test_config(wait_for_start: bool) -> SessionConfig {
        SessionConfig {
            wait_for_start,
            line_delay_ms: 0,
            ..SessionConfig::default()
        }
    }

    fn sent_lines(collect: &CollectSink) -> Vec<(usize, String)> {
        collect
            .snapshot()
            .into_iter()
            .filter(|e| e.kind == EventKind::LineSent)
            .map(|e| (e.line.unwrap(), e.text))
            .collect()
    }

    #[test]
    fn test_full_send_transmits_every_line_in_order() {
        // Scenario A: the second terminator is not a cutoff for full send.
        let program = Program::from_lines(["%", "G90", "G1 X1", "%", "G1 X2"]);
        let config = test_config(false);
        let expected = b"%\r\nG90\r\nG1 X1\r\n%\r\nG1 X2\r\n".to_vec();
        let mock = Box::new(MockSerialPort::new(vec![], expected));
        let collect = CollectSink::new();
        let mut sink = collect.clone();

        let engine = SendEngine::new(mock, &config, &program, StopToken::new(), &mut sink);
        engine.run_full().unwrap();

        assert_eq!(
            sent_lines(&collect),
            vec![
                (1, "%".to_string()),
                (2, "G90".to_string()),
                (3, "G1 X1".to_string()),
                (4, "%".to_string()),
                (5, "G1 X2".to_string()),
            ]
        );
    }

    #[test]
    fn test_blank_lines_are_skipped_without_events() {
        let program = Program::from_lines(["%", "", "   ", "M30"]);
        let config = test_config(false);
        let mock = Box::new(MockSerialPort::new(vec![], b"%\r\nM30\r\n".to_vec()));
        let collect = CollectSink::new();
        let mut sink = collect.clone();

        let engine = SendEngine::new(mock, &config, &program, StopToken::new(), &mut sink);
        engine.run_full().unwrap();

        assert_eq!(
            sent_lines(&collect),
            vec![(1, "%".to_string()), (4, "M30".to_string())]
        );
    }

    #[test]
    fn test_lines_are_stripped_before_transmission() {
        let program = Program::from_lines(["  G1 X1  "]);
        let config = test_config(false);
        let mock = Box::new(MockSerialPort::new(vec![], b"G1 X1\r\n".to_vec()));
        let collect = CollectSink::new();
        let mut sink = collect.clone();

        let engine = SendEngine::new(mock, &config, &program, StopToken::new(), &mut sink);
        engine.run_full().unwrap();
    }

    #[test]
    fn test_wait_for_start_holds_until_xon() {
        let program = Program::from_lines(["G90"]);
        let config = test_config(true);
        // One idle poll, one XOFF burst, then the XON that releases the line.
        let chunks = vec![None, Some(vec![XOFF]), Some(vec![XON])];
        let mock = Box::new(MockSerialPort::new(chunks, b"G90\r\n".to_vec()));
        let collect = CollectSink::new();
        let mut sink = collect.clone();

        let engine = SendEngine::new(mock, &config, &program, StopToken::new(), &mut sink);
        engine.run_full().unwrap();

        let texts: Vec<String> = collect.snapshot().into_iter().map(|e| e.text).collect();
        assert!(texts.contains(&"Waiting for XON to start transmission...".to_string()));
        assert!(texts.contains(&"Received XOFF, waiting for XON...".to_string()));
        assert!(texts.contains(&"Received XON, starting transmission.".to_string()));
    }

    #[test]
    fn test_xoff_blocks_transmission_at_the_next_line() {
        // XOFF before line 1, XON before line 2: the loop advances either
        // way, so the blocked line is paced over, not queued.
        let program = Program::from_lines(["G1 X1", "G1 X2", "G1 X3"]);
        let config = test_config(false);
        let chunks = vec![Some(vec![XOFF]), None, Some(vec![XON])];
        let mock = Box::new(MockSerialPort::new(chunks, b"G1 X2\r\nG1 X3\r\n".to_vec()));
        let collect = CollectSink::new();
        let mut sink = collect.clone();

        let engine = SendEngine::new(mock, &config, &program, StopToken::new(), &mut sink);
        engine.run_full().unwrap();

        assert_eq!(
            sent_lines(&collect),
            vec![(2, "G1 X2".to_string()), (3, "G1 X3".to_string())]
        );
    }

    #[test]
    fn test_xoff_wins_within_a_single_burst() {
        // Scenario D applied to the send path: both codes in one burst.
        let program = Program::from_lines(["G1 X1"]);
        let config = test_config(false);
        let chunks = vec![Some(vec![XON, XOFF])];
        let mock = Box::new(MockSerialPort::new(chunks, Vec::new()));
        let collect = CollectSink::new();
        let mut sink = collect.clone();

        let engine = SendEngine::new(mock, &config, &program, StopToken::new(), &mut sink);
        engine.run_full().unwrap();

        assert!(sent_lines(&collect).is_empty());
    }

    #[test]
    fn test_stop_token_preempts_transmission() {
        let program = Program::from_lines(["%", "G90", "%"]);
        let config = test_config(false);
        let mock = Box::new(MockSerialPort::new(vec![], Vec::new()));
        let stop = StopToken::new();
        stop.set();
        let collect = CollectSink::new();
        let mut sink = collect.clone();

        let engine = SendEngine::new(mock, &config, &program, stop, &mut sink);
        let result = engine.run_full();

        assert!(matches!(result, Err(TransferError::StopRequested)));
        assert!(sent_lines(&collect).is_empty());
    }

    #[test]
    fn test_stop_observed_within_the_start_poll() {
        // No XON ever arrives; a stop from another thread must release the
        // wait loop within a poll interval or two.
        let program = Program::from_lines(["G90"]);
        let config = test_config(true);
        let mock = Box::new(MockSerialPort::new(vec![], Vec::new()));
        let stop = StopToken::new();
        let collect = CollectSink::new();
        let mut sink = collect.clone();

        let stopper = stop.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            stopper.set();
        });

        let engine = SendEngine::new(mock, &config, &program, stop, &mut sink);
        let started = std::time::Instant::now();
        let result = engine.run_full();
        canceller.join().unwrap();

        assert!(matches!(result, Err(TransferError::StopRequested)));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_partial_send_scenario_b() {
        // Start line 3, boundary at the second `%` (index 3): exactly the
        // lines at indices 2 and 3 go out, with absolute numbering.
        let program = Program::from_lines(["%", "G90", "G1 X1", "%", "G1 X2"]);
        let config = test_config(false);
        let mock = Box::new(MockSerialPort::new(vec![], b"G1 X1\r\n%\r\n".to_vec()));
        let collect = CollectSink::new();
        let mut sink = collect.clone();

        let engine = SendEngine::new(mock, &config, &program, StopToken::new(), &mut sink);
        engine.run_partial(&StartPoint::Line(3)).unwrap();

        assert_eq!(
            sent_lines(&collect),
            vec![(3, "G1 X1".to_string()), (4, "%".to_string())]
        );
        let texts: Vec<String> = collect.snapshot().into_iter().map(|e| e.text).collect();
        assert!(texts.contains(&"Maximum line allowed for transmission: 4 (before second '%')".to_string()));
        assert!(texts.contains(&"Starting transmission from line 3.".to_string()));
    }

    #[test]
    fn test_partial_send_from_block_token() {
        let program = Program::from_lines(["%", "N100 G90", "N120 G1 X5", "N130 G1 X6", "%"]);
        let config = test_config(false);
        let expected = b"N120 G1 X5\r\nN130 G1 X6\r\n%\r\n".to_vec();
        let mock = Box::new(MockSerialPort::new(vec![], expected));
        let collect = CollectSink::new();
        let mut sink = collect.clone();

        let engine = SendEngine::new(mock, &config, &program, StopToken::new(), &mut sink);
        engine
            .run_partial(&StartPoint::Block("N120".to_string()))
            .unwrap();

        let sent = sent_lines(&collect);
        assert_eq!(sent.first(), Some(&(3, "N120 G1 X5".to_string())));
        assert_eq!(sent.last(), Some(&(5, "%".to_string())));
    }

    #[test]
    fn test_missing_token_transmits_nothing() {
        let program = Program::from_lines(["%", "N100 G90", "%"]);
        let config = test_config(false);
        let mock = Box::new(MockSerialPort::new(vec![], Vec::new()));
        let collect = CollectSink::new();
        let mut sink = collect.clone();

        let engine = SendEngine::new(mock, &config, &program, StopToken::new(), &mut sink);
        let result = engine.run_partial(&StartPoint::Block("N999".to_string()));

        assert!(matches!(result, Err(TransferError::StartPointNotFound(_))));
        assert!(sent_lines(&collect).is_empty());
    }

    #[test]
    fn test_start_past_window_transmits_nothing() {
        let program = Program::from_lines(["%", "G90", "%", "G1 X2"]);
        let config = test_config(false);
        let mock = Box::new(MockSerialPort::new(vec![], Vec::new()));
        let collect = CollectSink::new();
        let mut sink = collect.clone();

        let engine = SendEngine::new(mock, &config, &program, StopToken::new(), &mut sink);
        let result = engine.run_partial(&StartPoint::Line(4));

        assert!(matches!(result, Err(TransferError::RangeExceeded { .. })));
        assert!(sent_lines(&collect).is_empty());
    }

    #[test]
    fn test_cycle_send_reruns_after_fresh_xon() {
        let program = Program::from_lines(["%", "G90", "%"]);
        let config = SessionConfig {
            wait_for_start: false,
            cycle_send: true,
            line_delay_ms: 0,
            ..SessionConfig::default()
        };
        // Pass 1's three per-line drains each consume one empty poll, so the
        // XON is still buffered when the cycle wait begins; the wait after
        // pass 2 is broken by stop.
        let chunks = vec![None, None, None, Some(vec![XON])];
        let expected = b"%\r\nG90\r\n%\r\n%\r\nG90\r\n%\r\n".to_vec();
        let mock = Box::new(MockSerialPort::new(chunks, expected));
        let stop = StopToken::new();
        let collect = CollectSink::new();
        let mut sink = collect.clone();

        let stopper = stop.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            stopper.set();
        });

        let engine = SendEngine::new(mock, &config, &program, stop, &mut sink);
        let result = engine.run_full();
        canceller.join().unwrap();

        assert!(matches!(result, Err(TransferError::StopRequested)));
        assert_eq!(sent_lines(&collect).len(), 6);
        let texts: Vec<String> = collect.snapshot().into_iter().map(|e| e.text).collect();
        assert_eq!(
            texts
                .iter()
                .filter(|t| t.as_str() == "File sent successfully.")
                .count(),
            2
        );
        assert!(texts.contains(
            &"Cycle send enabled; awaiting start signal for next pass.".to_string()
        ));
    }
}
