//! Line-oriented progress reporting for a running split.
//!
//! The server streams one event per line: a bare percentage (`42`) while
//! ffmpeg works, or `error: <message>` when the split fails after the
//! response has already started.

use std::fmt;

const ERROR_PREFIX: &str = "error:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Percent(u8),
    Failed(String),
}

impl ProgressEvent {
    /// Encodes the event as a single newline-terminated wire line.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }

    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Some(message) = line.strip_prefix(ERROR_PREFIX) {
            return Some(ProgressEvent::Failed(message.trim().to_string()));
        }
        parse_percent(line).map(ProgressEvent::Percent)
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Percent(p) => write!(f, "{p}"),
            // Messages must stay on one line.
            ProgressEvent::Failed(msg) => {
                write!(f, "{ERROR_PREFIX} {}", msg.replace(['\r', '\n'], " "))
            }
        }
    }
}

/// Reads the leading integer of `text`, clamped to `0..=100`.
///
/// Leading whitespace and a sign are accepted and anything after the digits
/// is ignored, so `" 42%"` yields 42. Returns `None` when no digits lead.
pub fn parse_percent(text: &str) -> Option<u8> {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    if negative {
        return Some(0);
    }
    // Anything too long for u64 is far past 100 anyway.
    let value = digits[..end].parse::<u64>().unwrap_or(u64::MAX);
    Some(value.min(100) as u8)
}

/// Incremental decoder turning arbitrary body chunks into progress events.
#[derive(Debug, Default)]
pub struct ProgressDecoder {
    pending: Vec<u8>,
}

impl ProgressDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ProgressEvent> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(event) = ProgressEvent::parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing line that had no terminating newline.
    pub fn finish(&mut self) -> Option<ProgressEvent> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        ProgressEvent::parse_line(&String::from_utf8_lossy(&line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_parsing_follows_integer_prefix_rules() {
        assert_eq!(parse_percent("42"), Some(42));
        assert_eq!(parse_percent("  7%"), Some(7));
        assert_eq!(parse_percent("+15"), Some(15));
        assert_eq!(parse_percent("250"), Some(100));
        assert_eq!(parse_percent("99999999999999999999999"), Some(100));
        assert_eq!(parse_percent("-3"), Some(0));
        assert_eq!(parse_percent("abc"), None);
        assert_eq!(parse_percent(""), None);
        assert_eq!(parse_percent("-"), None);
    }

    #[test]
    fn decoder_handles_lines_split_across_chunks() {
        let mut decoder = ProgressDecoder::new();
        assert!(decoder.feed(b"1").is_empty());
        assert_eq!(
            decoder.feed(b"0\n55\n10"),
            vec![ProgressEvent::Percent(10), ProgressEvent::Percent(55)]
        );
        assert_eq!(decoder.feed(b"0\n"), vec![ProgressEvent::Percent(100)]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn decoder_reports_failures_and_skips_noise() {
        let mut decoder = ProgressDecoder::new();
        let events = decoder.feed(b"<html>\n30\nerror: Error processing video\n");
        assert_eq!(
            events,
            vec![
                ProgressEvent::Percent(30),
                ProgressEvent::Failed("Error processing video".into()),
            ]
        );
    }

    #[test]
    fn trailing_line_is_flushed_on_finish() {
        let mut decoder = ProgressDecoder::new();
        assert!(decoder.feed(b"64").is_empty());
        assert_eq!(decoder.finish(), Some(ProgressEvent::Percent(64)));
    }

    #[test]
    fn failure_messages_stay_on_one_line() {
        let line = ProgressEvent::Failed("bad\ninput".into()).to_line();
        assert_eq!(line, "error: bad input\n");
        assert_eq!(ProgressEvent::Percent(5).to_line(), "5\n");
    }
}
