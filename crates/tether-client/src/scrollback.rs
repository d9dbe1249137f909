//! Scrollback reassembly
//!
//! The daemon serves history in ranges of absolutely numbered lines; a
//! front-end asks for older ranges as the user scrolls up. Responses can
//! arrive out of order, overlap, or duplicate lines already held, so the
//! buffer merges by line number and stays sorted. One request may be in
//! flight at a time; overlapping load-more calls collapse into it.

use tether_protocol::ScrollbackLine;

/// Merged, ordered scrollback history for one agent
#[derive(Debug, Default)]
pub struct ScrollbackBuffer {
    /// Held lines, sorted ascending by absolute line number, no duplicates
    lines: Vec<ScrollbackLine>,
    /// Total history length the daemon last reported
    total_lines: u64,
    /// Whether a range request is currently in flight
    request_in_flight: bool,
}

impl ScrollbackBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one response batch. Lines already held are skipped, so
    /// duplicate and overlapping ranges are idempotent.
    pub fn merge(&mut self, batch: Vec<ScrollbackLine>, total_lines: u64) {
        self.total_lines = self.total_lines.max(total_lines);
        for line in batch {
            match self.lines.binary_search_by_key(&line.line_no, |l| l.line_no) {
                Ok(_) => {}
                Err(pos) => self.lines.insert(pos, line),
            }
        }
    }

    /// Whether older history remains beyond the oldest held line
    pub fn has_more(&self) -> bool {
        match self.lines.first() {
            Some(first) => first.line_no > 0,
            None => self.total_lines > 0,
        }
    }

    /// Oldest held line number, if any
    pub fn oldest_line_no(&self) -> Option<u64> {
        self.lines.first().map(|l| l.line_no)
    }

    /// Held lines in ascending order
    pub fn lines(&self) -> &[ScrollbackLine] {
        &self.lines
    }

    /// Total history length the daemon last reported
    pub fn total_lines(&self) -> u64 {
        self.total_lines
    }

    /// Number of held lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether no lines are held
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Mark a range request as started. Returns false if one is already in
    /// flight, in which case the caller should not issue another.
    pub fn begin_request(&mut self) -> bool {
        if self.request_in_flight {
            return false;
        }
        self.request_in_flight = true;
        true
    }

    /// Mark the in-flight request finished (response arrived or failed)
    pub fn complete_request(&mut self) {
        self.request_in_flight = false;
    }

    /// Whether a request is currently in flight
    pub fn request_in_flight(&self) -> bool {
        self.request_in_flight
    }

    /// The range to ask for next, walking backwards from the oldest held
    /// line: `(from_line, count)`. `None` once everything is loaded.
    pub fn next_range(&self, page_size: u64) -> Option<(u64, u64)> {
        if !self.has_more() {
            return None;
        }
        let end = self.oldest_line_no().unwrap_or(self.total_lines);
        let from = end.saturating_sub(page_size);
        Some((from, end - from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: u64) -> ScrollbackLine {
        ScrollbackLine {
            line_no: n,
            text: format!("line {}", n),
        }
    }

    fn batch(range: std::ops::Range<u64>) -> Vec<ScrollbackLine> {
        range.map(line).collect()
    }

    #[test]
    fn test_merge_keeps_lines_sorted() {
        let mut buf = ScrollbackBuffer::new();
        buf.merge(batch(50..60), 100);
        buf.merge(batch(10..20), 100);

        let numbers: Vec<u64> = buf.lines().iter().map(|l| l.line_no).collect();
        let mut sorted = numbers.clone();
        sorted.sort_unstable();
        assert_eq!(numbers, sorted);
        assert_eq!(buf.len(), 20);
    }

    #[test]
    fn test_overlapping_merge_is_idempotent() {
        let mut buf = ScrollbackBuffer::new();
        buf.merge(batch(10..30), 100);
        buf.merge(batch(20..40), 100);
        buf.merge(batch(10..30), 100);

        assert_eq!(buf.len(), 30);
        assert_eq!(buf.oldest_line_no(), Some(10));
    }

    #[test]
    fn test_has_more_at_top_of_history() {
        let mut buf = ScrollbackBuffer::new();
        assert!(!buf.has_more());

        buf.merge(batch(5..10), 10);
        assert!(buf.has_more());

        buf.merge(batch(0..5), 10);
        assert!(!buf.has_more());
    }

    #[test]
    fn test_in_flight_requests_collapse() {
        let mut buf = ScrollbackBuffer::new();
        assert!(buf.begin_request());
        assert!(!buf.begin_request());

        buf.complete_request();
        assert!(buf.begin_request());
    }

    #[test]
    fn test_next_range_walks_backwards() {
        let mut buf = ScrollbackBuffer::new();
        buf.merge(batch(90..100), 100);

        assert_eq!(buf.next_range(50), Some((40, 50)));
        buf.merge(batch(40..90), 100);
        assert_eq!(buf.next_range(50), Some((0, 40)));
        buf.merge(batch(0..40), 100);
        assert_eq!(buf.next_range(50), None);
    }

    #[test]
    fn test_empty_buffer_requests_from_tail() {
        let mut buf = ScrollbackBuffer::new();
        buf.merge(vec![], 30);
        assert_eq!(buf.next_range(10), Some((20, 10)));
    }
}
