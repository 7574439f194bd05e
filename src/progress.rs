//! One-line progress reporting for long-running waits.

use std::io::{self, Write};

const FILLED: char = '▣';
const EMPTY: char = '_';

/// Receives single-line status updates while a fleet converges.
pub trait ProgressReporter {
    /// Replaces the current status line.
    fn update(&self, line: &str);

    /// Signals that the wait finished.
    fn finish(&self);
}

/// Discards all updates.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn update(&self, _line: &str) {}

    fn finish(&self) {}
}

/// Redraws a single status line on stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalProgress;

impl ProgressReporter for TerminalProgress {
    fn update(&self, line: &str) {
        let mut stderr = io::stderr().lock();
        write!(stderr, "\r\x1b[2K{line}").ok();
        stderr.flush().ok();
    }

    fn finish(&self) {
        writeln!(io::stderr(), "\nDone").ok();
    }
}

/// Formats `<label>  [ ▣▣▣___ ]` with `current` clamped to `total`.
#[must_use]
pub fn progress_line(label: &str, current: usize, total: usize) -> String {
    let done = current.min(total);
    let filled = FILLED.to_string().repeat(done);
    let empty = EMPTY.to_string().repeat(total - done);
    format!("{label}  [ {filled}{empty} ]")
}
