//! Newline framing over an arbitrarily chunked byte stream.
//!
//! Bytes are pushed as they arrive from the socket; complete, trimmed,
//! non-empty lines come out. Partial lines are buffered across reads, a single
//! read may carry many lines, and a line that grows past the size limit is
//! dropped in its entirety without ending the connection.

use serde_json::{Map, Value};

/// Counters for one connection's framing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Non-empty lines delivered.
    pub lines: u64,
    /// Lines that decoded to a JSON object.
    pub parsed: u64,
    /// Lines discarded as malformed (not JSON, or not an object).
    pub malformed: u64,
    /// Lines discarded for exceeding the size limit.
    pub overlong: u64,
}

/// Incremental buffer-and-split state machine.
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_line: usize,
    /// Inside an overlong line; drop bytes until the next newline.
    discarding: bool,
    overlong: u64,
}

impl LineFramer {
    pub fn new(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line,
            discarding: false,
            overlong: 0,
        }
    }

    /// Feed one chunk and collect every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                self.buf.clear();
                continue;
            }

            self.buf.extend_from_slice(head);
            if self.buf.len() > self.max_line {
                self.overlong += 1;
            } else if let Some(line) = decode(&self.buf) {
                lines.push(line);
            }
            self.buf.clear();
        }

        if !self.discarding {
            self.buf.extend_from_slice(rest);
            if self.buf.len() > self.max_line {
                self.buf.clear();
                self.discarding = true;
                self.overlong += 1;
            }
        }

        lines
    }

    /// Bytes of an incomplete trailing line still buffered.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Number of overlong lines dropped so far.
    pub fn overlong(&self) -> u64 {
        self.overlong
    }
}

fn decode(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let line = text.trim();
    (!line.is_empty()).then(|| line.to_string())
}

/// Parse one framed line as a JSON object; anything else is `None`.
pub fn parse_object(line: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_multiple_lines_in_one_chunk() {
        let mut framer = LineFramer::new(1024);
        let lines = framer.push(b"{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn reassembles_across_partial_reads() {
        let mut framer = LineFramer::new(1024);
        assert!(framer.push(b"{\"seq\"").is_empty());
        assert!(framer.push(b":4").is_empty());
        assert_eq!(framer.pending(), 8);
        assert_eq!(framer.push(b"2}\n{\"x\""), vec!["{\"seq\":42}"]);
        assert_eq!(framer.pending(), 4);
    }

    #[test]
    fn skips_blank_lines_and_trims_crlf() {
        let mut framer = LineFramer::new(1024);
        let lines = framer.push(b"\n   \n{\"a\":1}\r\n\n");
        assert_eq!(lines, vec!["{\"a\":1}"]);
    }

    #[test]
    fn drops_overlong_line_and_recovers() {
        let mut framer = LineFramer::new(8);
        assert!(framer.push(b"0123456789").is_empty());
        assert!(framer.push(b"abcdef").is_empty());
        let lines = framer.push(b"ghi\n{\"ok\":1}\n");
        assert_eq!(lines, vec!["{\"ok\":1}"]);
        assert_eq!(framer.overlong(), 1);
    }

    #[test]
    fn drops_overlong_line_completed_in_one_chunk() {
        let mut framer = LineFramer::new(4);
        let lines = framer.push(b"toolong\nok\n");
        assert_eq!(lines, vec!["ok"]);
        assert_eq!(framer.overlong(), 1);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let mut framer = LineFramer::new(64);
        let lines = framer.push(b"{\"a\":\"\xff\"}\n");
        assert_eq!(lines.len(), 1);
        assert!(parse_object(&lines[0]).is_some());
    }

    #[test]
    fn parse_object_rejects_non_objects() {
        assert!(parse_object("{\"data\":[1,2]}").is_some());
        assert!(parse_object("[1,2,3]").is_none());
        assert!(parse_object("42").is_none());
        assert!(parse_object("{not json").is_none());
    }
}
