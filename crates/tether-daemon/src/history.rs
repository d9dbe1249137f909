//! Per-agent output history
//!
//! Holds numbered terminal output lines so clients can backfill scrollback.
//! Line numbers are absolute and monotonically increasing from 0; bounded
//! retention drops the oldest lines while numbering keeps advancing. A
//! trailing partial line is buffered until its terminator arrives.

use std::collections::VecDeque;

use tether_protocol::ScrollbackLine;

/// Default retention, in completed lines
pub const DEFAULT_MAX_LINES: usize = 10_000;

/// Line-numbered history of one agent's output stream
pub struct HistoryBuffer {
    /// Completed lines currently retained
    lines: VecDeque<String>,
    /// Absolute line number of `lines[0]`
    first_line_no: u64,
    /// Partial line awaiting its terminator
    partial: String,
    /// Retention bound
    max_lines: usize,
}

impl HistoryBuffer {
    /// Create a buffer with the default retention
    pub fn new() -> Self {
        Self::with_max_lines(DEFAULT_MAX_LINES)
    }

    /// Create a buffer retaining at most `max_lines` completed lines
    pub fn with_max_lines(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            first_line_no: 0,
            partial: String::new(),
            max_lines: max_lines.max(1),
        }
    }

    /// Feed raw output. Splits on newline boundaries; a trailing fragment
    /// stays buffered until the next feed completes it.
    pub fn feed(&mut self, data: &[u8]) {
        let text = String::from_utf8_lossy(data);
        for ch in text.chars() {
            if ch == '\n' {
                let mut line = std::mem::take(&mut self.partial);
                if line.ends_with('\r') {
                    line.pop();
                }
                self.lines.push_back(line);
                while self.lines.len() > self.max_lines {
                    self.lines.pop_front();
                    self.first_line_no += 1;
                }
            } else {
                self.partial.push(ch);
            }
        }
    }

    /// Total completed lines ever produced (the partial line is not counted)
    pub fn total_lines(&self) -> u64 {
        self.first_line_no + self.lines.len() as u64
    }

    /// Absolute line number of the oldest retained line
    pub fn first_line_no(&self) -> u64 {
        self.first_line_no
    }

    /// Fetch up to `count` lines starting at absolute line `from_line`,
    /// clipped to what is retained.
    pub fn range(&self, from_line: u64, count: u64) -> Vec<ScrollbackLine> {
        let total = self.total_lines();
        let start = from_line.max(self.first_line_no).min(total);
        let end = from_line.saturating_add(count).min(total);

        (start..end)
            .map(|n| ScrollbackLine {
                line_no: n,
                text: self.lines[(n - self.first_line_no) as usize].clone(),
            })
            .collect()
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}
