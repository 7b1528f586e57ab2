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

//! Operation admission, cooperative cancellation, and the worker boundary
//! where engine results become events and the port is released.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::config::SessionConfig;
use crate::error::TransferError;
use crate::event::{EventSink, TransferEvent};
use crate::program::{Program, StartPoint};
use crate::receiver::ReceiveEngine;
use crate::sender::SendEngine;
use crate::serial::{self, RealSerialPort, SerialPort};

// ============================================================================
// Operation State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Send,
    PartialSend,
    Receive,
}

impl OperationKind {
    fn label(self) -> &'static str {
        match self {
            OperationKind::Send => "Send",
            OperationKind::PartialSend => "Partial Send",
            OperationKind::Receive => "Receive",
        }
    }

    fn loop_label(self) -> &'static str {
        match self {
            OperationKind::Send => "send",
            OperationKind::PartialSend => "transmission",
            OperationKind::Receive => "receive",
        }
    }

    fn closing_label(self) -> &'static str {
        match self {
            OperationKind::Send => "sending",
            OperationKind::PartialSend => "partial sending",
            OperationKind::Receive => "receiving",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Idle,
    Busy(OperationKind),
}

// ============================================================================
// Stop Token
// ============================================================================

/// Shared cancellation flag: set by `cancel()`, cleared on admission, polled
/// by the active worker at every suspension point.
#[derive(Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        StopToken::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Operation Controller
// ============================================================================

/// Admits at most one transfer operation at a time and hands it a worker
/// thread. The worker alone moves the state back to Idle, on every exit path.
pub struct OperationController {
    config: SessionConfig,
    state: Arc<Mutex<OperationState>>,
    stop: StopToken,
}

type WorkerBody = Box<
    dyn FnOnce(
            Box<dyn SerialPort>,
            &SessionConfig,
            StopToken,
            &mut dyn EventSink,
        ) -> Result<(), TransferError>
        + Send,
>;

impl OperationController {
    pub fn new(config: SessionConfig) -> Self {
        OperationController {
            config,
            state: Arc::new(Mutex::new(OperationState::Idle)),
            stop: StopToken::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> OperationState {
        *lock_state(&self.state)
    }

    /// Request cooperative cancellation of the active operation. Observed
    /// within one polling interval.
    pub fn cancel(&self) {
        self.stop.set();
    }

    /// Transmit the whole program. Returns the worker handle, or `None` when
    /// another operation holds the port.
    pub fn send(&self, program: Program, sink: Box<dyn EventSink>) -> Option<JoinHandle<bool>> {
        self.begin(
            OperationKind::Send,
            sink,
            Box::new(move |port, config, stop, sink| {
                SendEngine::new(port, config, &program, stop, sink).run_full()
            }),
        )
    }

    /// Transmit from a line number or block token through the second
    /// terminator.
    pub fn partial_send(
        &self,
        program: Program,
        start: StartPoint,
        sink: Box<dyn EventSink>,
    ) -> Option<JoinHandle<bool>> {
        self.begin(
            OperationKind::PartialSend,
            sink,
            Box::new(move |port, config, stop, sink| {
                SendEngine::new(port, config, &program, stop, sink).run_partial(&start)
            }),
        )
    }

    /// Capture inbound data into `dest` until the second terminator.
    pub fn receive(
        &self,
        mut dest: Box<dyn Write + Send>,
        sink: Box<dyn EventSink>,
    ) -> Option<JoinHandle<bool>> {
        self.begin(
            OperationKind::Receive,
            sink,
            Box::new(move |port, config, stop, sink| {
                ReceiveEngine::new(port, config, stop, sink).run(dest.as_mut())
            }),
        )
    }

    fn begin(
        &self,
        kind: OperationKind,
        mut sink: Box<dyn EventSink>,
        body: WorkerBody,
    ) -> Option<JoinHandle<bool>> {
        if !self.admit(kind) {
            sink.emit(TransferEvent::info(format!(
                "Another operation is active. Cannot start {}.",
                kind.label()
            )));
            return None;
        }

        let config = self.config.clone();
        let state = Arc::clone(&self.state);
        let stop = self.stop.clone();
        let handle = thread::spawn(move || {
            let ok = run_worker(kind, &config, stop, sink.as_mut(), body);
            *lock_state(&state) = OperationState::Idle;
            debug!("{} worker finished, state is Idle", kind.label());
            ok
        });
        Some(handle)
    }

    /// The single guarded Idle -> Busy transition. Clears any stale stop
    /// request from a previous operation.
    fn admit(&self, kind: OperationKind) -> bool {
        let mut state = lock_state(&self.state);
        if *state != OperationState::Idle {
            return false;
        }
        *state = OperationState::Busy(kind);
        self.stop.clear();
        true
    }
}

fn lock_state(state: &Mutex<OperationState>) -> MutexGuard<'_, OperationState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Acquire the port, run the engine, and fold every outcome into the event
/// stream. Returns `true` for a clean finish or a user stop.
fn run_worker(
    kind: OperationKind,
    config: &SessionConfig,
    stop: StopToken,
    sink: &mut dyn EventSink,
    body: WorkerBody,
) -> bool {
    serial::force_release(config, sink);

    let port: Box<dyn SerialPort> = match RealSerialPort::open(config) {
        Ok(port) => Box::new(port),
        Err(e) => {
            sink.emit(TransferEvent::error(format!(
                "Error while accessing {}: {}",
                config.port, e
            )));
            return false;
        }
    };
    sink.emit(TransferEvent::info(format!(
        "Opened {} successfully.",
        config.port
    )));

    // The engine consumes the port; by the time body returns it is closed,
    // on success and failure alike.
    let ok = match body(port, config, stop, sink) {
        Ok(()) => true,
        Err(TransferError::StopRequested) => {
            sink.emit(TransferEvent::info(format!(
                "Stop requested. Closing port and exiting {} loop.",
                kind.loop_label()
            )));
            true
        }
        Err(e) => {
            sink.emit(TransferEvent::error(e.to_string()));
            false
        }
    };
    sink.emit(TransferEvent::info(format!(
        "COM port closed after {}.",
        kind.closing_label()
    )));
    ok
}

// ============================================================================
// Tests
// ============================================================================
