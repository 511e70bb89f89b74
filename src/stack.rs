//! Creation-site tokens and engine-filtered stack capture
//!
//! Contract specifications and contract functions each remember where they
//! were created, and every taxonomy error captures a stack snapshot at
//! construction. Frames that belong to the engine itself are filtered out so
//! that diagnostics point at caller code.

use std::backtrace::Backtrace;
use std::fmt;
use std::panic;

use serde::Serialize;

/// A single-line creation-site token.
///
/// Captured with `#[track_caller]`, so the token names the line that invoked
/// the engine, not the engine internals. Specifications generated by the
/// engine itself carry the [`Location::internal`] sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    file: &'static str,
    line: u32,
    column: u32,
}

impl Location {
    const INTERNAL: Location = Location {
        file: "<covenant>",
        line: 0,
        column: 0,
    };

    /// Capture the caller's source location.
    #[track_caller]
    pub fn caller() -> Self {
        let caller = panic::Location::caller();
        Location {
            file: caller.file(),
            line: caller.line(),
            column: caller.column(),
        }
    }

    /// The sentinel location for internally generated specifications.
    pub fn internal() -> Self {
        Self::INTERNAL
    }

    /// Whether this is the internal sentinel.
    pub fn is_internal(&self) -> bool {
        *self == Self::INTERNAL
    }

    pub fn file(&self) -> &'static str {
        self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> u32 {
        self.column
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_internal() {
            write!(f, "{}", self.file)
        } else {
            write!(f, "{}:{}:{}", self.file, self.line, self.column)
        }
    }
}

/// A raw stack snapshot restricted to frames outside the engine.
///
/// Captured once, at error construction. An unavailable backtrace yields an
/// empty snapshot rather than an error.
#[derive(Debug, Clone, Default)]
pub struct StackTrace {
    frames: Vec<String>,
}

impl StackTrace {
    pub(crate) fn capture() -> Self {
        let raw = Backtrace::force_capture().to_string();
        StackTrace {
            frames: filter_engine_frames(&raw),
        }
    }

    /// The retained frame lines, outermost engine caller first.
    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, frame) in self.frames.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", frame)?;
        }
        Ok(())
    }
}

/// Symbols that mark a frame as engine (or capture machinery) internal.
const ENGINE_MARKERS: [&str; 3] = ["covenant::", "std::backtrace", "backtrace::backtrace"];

fn filter_engine_frames(raw: &str) -> Vec<String> {
    let mut frames = Vec::new();
    // "at file:line" continuation lines belong to the preceding frame header.
    let mut keeping = false;
    for line in raw.lines() {
        let trimmed = line.trim_start();
        match frame_symbol(trimmed) {
            Some(symbol) => {
                keeping = !ENGINE_MARKERS.iter().any(|marker| symbol.contains(marker));
                if keeping {
                    frames.push(trimmed.to_string());
                }
            }
            None => {
                if keeping {
                    frames.push(trimmed.to_string());
                }
            }
        }
    }
    frames
}

/// Parse the symbol out of a `N: symbol` frame header line.
fn frame_symbol(line: &str) -> Option<&str> {
    let (index, rest) = line.split_once(':')?;
    if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(rest.trim_start())
}
