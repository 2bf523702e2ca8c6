//! Console pattern matching.
//!
//! The bootloader console is matched in one of two disciplines:
//!
//! - **Line mode**: input is split on `\n` (trailing `\r` removed) and each
//!   complete line is tested with a prefix match.
//! - **Chunk mode**: input is treated as an opaque byte stream and searched
//!   for a literal anywhere. Bytes are buffered so that a marker split
//!   across two reads is still found.
//!
//! [`MatchBuffer`] is I/O free: callers push whatever the port returned and
//! ask for the next match.

use std::time::Duration;

/// Longest partial line kept in line mode. Anything longer is dropped up to
/// its newline.
pub const MAX_LINE_LEN: usize = 4096;

/// How a [`MatchRule`] tests the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchKind {
    /// A complete line starting with the literal.
    LineStartsWith(String),
    /// The literal anywhere in the byte stream.
    Contains(String),
}

/// A predicate over console text with an optional time budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRule {
    kind: MatchKind,
    timeout: Option<Duration>,
}

impl MatchRule {
    /// Match a line that starts with `prefix` (line mode).
    pub fn line_starts_with(prefix: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::LineStartsWith(prefix.into()),
            timeout: None,
        }
    }

    /// Match `needle` anywhere in the stream (chunk mode).
    pub fn contains(needle: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::Contains(needle.into()),
            timeout: None,
        }
    }

    /// Give up once `timeout` has elapsed without a match.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The predicate.
    pub fn kind(&self) -> &MatchKind {
        &self.kind
    }

    /// The time budget, `None` for an unbounded wait.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The literal this rule looks for.
    pub fn pattern(&self) -> &str {
        match &self.kind {
            MatchKind::LineStartsWith(p) | MatchKind::Contains(p) => p,
        }
    }
}

/// Accumulates console bytes and hands out matches.
#[derive(Debug, Default)]
pub struct MatchBuffer {
    buf: Vec<u8>,
    units_consumed: usize,
    skipping_line: bool,
}

impl MatchBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the port.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf
            .extend_from_slice(bytes);
    }

    /// Bytes currently held.
    pub fn len(&self) -> usize {
        self.buf
            .len()
    }

    /// Whether no bytes are held.
    pub fn is_empty(&self) -> bool {
        self.buf
            .is_empty()
    }

    /// Number of lines discarded or matched in line mode since creation.
    pub fn lines_consumed(&self) -> usize {
        self.units_consumed
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.buf
            .clear();
        self.skipping_line = false;
    }

    /// Consume input up to and including the next match of `kind`.
    ///
    /// Returns the matched text (the whole line in line mode, the marker in
    /// chunk mode), or `None` if the buffered input holds no match yet.
    /// Input that can no longer take part in a match is discarded.
    pub fn take_match(&mut self, kind: &MatchKind) -> Option<String> {
        match kind {
            MatchKind::LineStartsWith(prefix) => self.take_line(prefix),
            MatchKind::Contains(needle) => self.take_contains(needle),
        }
    }

    fn take_line(&mut self, prefix: &str) -> Option<String> {
        while let Some(end) = self
            .buf
            .iter()
            .position(|&b| b == b'\n')
        {
            let raw: Vec<u8> = self
                .buf
                .drain(..=end)
                .collect();
            self.units_consumed += 1;
            if std::mem::take(&mut self.skipping_line) {
                continue;
            }

            let text = String::from_utf8_lossy(&raw);
            let line = text.trim_end_matches(['\n', '\r']);
            log::trace!("console line: {line:?}");

            if line.starts_with(prefix) {
                return Some(line.to_string());
            }
        }

        if self.buf.len() > MAX_LINE_LEN {
            log::debug!("Dropping {} bytes without a line break", self.buf.len());
            self.buf
                .clear();
            self.skipping_line = true;
        }
        None
    }

    fn take_contains(&mut self, needle: &str) -> Option<String> {
        let needle = needle.as_bytes();
        if needle.is_empty() {
            return Some(String::new());
        }

        if let Some(start) = self
            .buf
            .windows(needle.len())
            .position(|w| w == needle)
        {
            self.buf
                .drain(..start + needle.len());
            return Some(String::from_utf8_lossy(needle).into_owned());
        }

        // Only a tail shorter than the needle can still start a match
        let keep = needle.len() - 1;
        if self.buf.len() > keep {
            let cut = self.buf.len() - keep;
            self.buf
                .drain(..cut);
        }
        None
    }
}
