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

//! DNC drip-feed transfer engine: streams CNC part programs to and from a
//! machine controller over a serial link under XON/XOFF flow control.
//!
//! The engine is presentation-agnostic: operations report progress as a
//! stream of [`event::TransferEvent`]s, and any front end supplies the
//! [`event::EventSink`] and drives [`controller::OperationController`].

pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod flow;
pub mod program;
pub mod receiver;
pub mod sender;
pub mod serial;
