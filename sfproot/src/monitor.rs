//! Console text helpers.
//!
//! Shared by the console reader (for logging what the device prints) and
//! by interactive monitors that echo the device to a terminal.

/// Incremental UTF-8 decoder for console bytes.
///
/// Bytes arrive in arbitrary chunks, so a multi-byte character can be cut in
/// half by a read. The incomplete tail is held back until the next push.
#[derive(Debug, Default)]
pub struct TextDecoder {
    pending: Vec<u8>,
}

impl TextDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return the text that is complete so far.
    ///
    /// Invalid sequences become `�` instead of stalling the stream.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending
            .extend_from_slice(bytes);

        let mut output = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    output.push_str(valid);
                    self.pending
                        .clear();
                    return output;
                },
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    output.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));

                    let Some(invalid_len) = err.error_len() else {
                        // Incomplete character at the end: wait for more bytes
                        self.pending
                            .drain(..valid_up_to);
                        return output;
                    };
                    output.push('\u{FFFD}');
                    self.pending
                        .drain(..valid_up_to + invalid_len);
                },
            }
        }
    }
}

/// Make console text safe to print.
///
/// `\r\n` and lone `\r` become `\n`; tabs are kept; other control characters
/// (the bootloader echoes Ctrl-C, terminal escapes, NULs) are dropped.
pub fn clean_console_text(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let mut out = String::with_capacity(normalized.len());
    for ch in normalized.chars() {
        match ch {
            '\n' | '\t' => out.push(ch),
            '\r' => out.push('\n'),
            _ if ch.is_control() => {},
            _ => out.push(ch),
        }
    }
    out
}

/// Convert `\n` to `\r\n` for a terminal in raw mode.
pub fn to_raw_terminal(text: &str) -> String {
    text.replace('\n', "\r\n")
}
