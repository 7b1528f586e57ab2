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

//! Loaded part program: line index, terminator boundary, start resolution.
//!
//! Program convention: a line whose trimmed content is exactly `%` is a
//! terminator. A well-formed program opens with one and a matching second
//! terminator marks end-of-program; content past it is never part of a
//! partial send.

use std::path::Path;

use crate::error::TransferError;

/// Program delimiter line content.
pub const TERMINATOR: &str = "%";

// ============================================================================
// Start Selection
// ============================================================================

/// Where a partial send begins.
#[derive(Debug, Clone)]
pub enum StartPoint {
    /// Explicit 1-based line number.
    Line(usize),
    /// Block-number token, e.g. `N120`; first line whose stripped content
    /// starts with it.
    Block(String),
}

/// Inclusive index range of lines eligible for one transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferWindow {
    pub start: usize,
    pub end: usize,
}

// ============================================================================
// Program
// ============================================================================

/// An ordered sequence of raw text lines, read once at operation start and
/// immutable thereafter.
#[derive(Debug, Clone)]
pub struct Program {
    lines: Vec<String>,
}

impl Program {
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Program::from_lines(raw.lines().map(String::from)))
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Program {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> &str {
        &self.lines[index]
    }

    /// Index of the second terminator if one exists past index 0, else the
    /// last index of the program.
    pub fn boundary_index(&self) -> usize {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 && line.trim() == TERMINATOR {
                return i;
            }
        }
        self.len().saturating_sub(1)
    }

    /// Window for a full send: every line through end-of-file. A trailing
    /// second terminator is deliberately not a cutoff here.
    pub fn full_window(&self) -> TransferWindow {
        TransferWindow {
            start: 0,
            end: self.len().saturating_sub(1),
        }
    }

    /// Resolve the start selector to a 0-based index, without range checks.
    ///
    /// Numeric starts below line 2 are raised to line 2; the leading
    /// terminator line is only reachable through a full send.
    pub fn resolve_start(&self, start: &StartPoint) -> Result<usize, TransferError> {
        match start {
            StartPoint::Line(number) => Ok(number.saturating_sub(1).max(1)),
            StartPoint::Block(token) => self
                .lines
                .iter()
                .position(|line| line.trim_start().starts_with(token.as_str()))
                .ok_or_else(|| TransferError::StartPointNotFound(token.clone())),
        }
    }

    /// Window for a partial send: resolved start through the second
    /// terminator (or end-of-file when there is none).
    pub fn partial_window(&self, start: &StartPoint) -> Result<TransferWindow, TransferError> {
        let boundary = self.boundary_index();
        let start = self.resolve_start(start)?;
        if start > boundary {
            return Err(TransferError::RangeExceeded { start, boundary });
        }
        Ok(TransferWindow { start, end: boundary })
    }
}

// ============================================================================
// Tests
// ============================================================================
