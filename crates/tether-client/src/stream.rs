//! Live output reassembly
//!
//! Terminal output arrives in arbitrary chunks that need not align with
//! line boundaries. The assembler splits chunks on newlines and buffers a
//! trailing partial line until its terminator shows up in a later chunk.

/// Splits a byte stream into complete lines
#[derive(Debug, Default)]
pub struct StreamAssembler {
    partial: String,
}

impl StreamAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one output chunk, returning the lines it completed. Trailing
    /// carriage returns are stripped; the final unterminated fragment is
    /// held for the next chunk.
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(data);
        let mut completed = Vec::new();

        for ch in text.chars() {
            if ch == '\n' {
                let mut line = std::mem::take(&mut self.partial);
                if line.ends_with('\r') {
                    line.pop();
                }
                completed.push(line);
            } else {
                self.partial.push(ch);
            }
        }
        completed
    }

    /// The unterminated fragment currently held
    pub fn partial(&self) -> &str {
        &self.partial
    }

    /// Drop and return whatever fragment is held. Used when a stream ends
    /// without a final newline.
    pub fn flush(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.partial))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_chunks() {
        let mut assembler = StreamAssembler::new();
        assert!(assembler.feed(b"hel").is_empty());
        assert_eq!(assembler.feed(b"lo\nwor"), vec!["hello"]);
        assert_eq!(assembler.feed(b"ld\n"), vec!["world"]);
        assert!(assembler.partial().is_empty());
    }

    #[test]
    fn test_crlf_stripped() {
        let mut assembler = StreamAssembler::new();
        assert_eq!(assembler.feed(b"prompt$\r\n"), vec!["prompt$"]);
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut assembler = StreamAssembler::new();
        assert_eq!(assembler.feed(b"a\nb\nc"), vec!["a", "b"]);
        assert_eq!(assembler.partial(), "c");
    }

    #[test]
    fn test_flush_returns_leftover() {
        let mut assembler = StreamAssembler::new();
        assembler.feed(b"no newline");
        assert_eq!(assembler.flush(), Some("no newline".to_string()));
        assert_eq!(assembler.flush(), None);
    }
}
