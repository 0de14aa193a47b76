/// Incremental byte-to-line splitter.
///
/// Bytes are buffered until a terminator arrives and each completed line is
/// decoded as UTF-8 with invalid sequences replaced by U+FFFD. Decoding only
/// happens at line boundaries, so a multi-byte character split across two
/// reads is reassembled correctly.
///
/// In carriage-return mode a lone `\r` also ends a line and `\r\n` counts as a
/// single break, which is how progress output that rewrites the same terminal
/// row ends up as separate lines.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
    break_on_cr: bool,
    skip_lf: bool,
}

impl LineSplitter {
    /// Split on `\n` only. A preceding `\r` is left in the line.
    pub fn new() -> Self {
        Self::default()
    }

    /// Split on `\n`, `\r` and `\r\n`.
    pub fn with_carriage_return() -> Self {
        Self {
            break_on_cr: true,
            ..Self::default()
        }
    }

    /// Feed a chunk and return the lines it completed, without terminators.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in bytes {
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }

            match byte {
                b'\n' => lines.push(self.take_pending()),
                b'\r' if self.break_on_cr => {
                    lines.push(self.take_pending());
                    self.skip_lf = true;
                }
                _ => self.pending.push(byte),
            }
        }

        lines
    }

    /// Return the unterminated remainder, if any.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_pending())
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn take_pending(&mut self) -> String {
        let line = decode_lossy(&self.pending);
        self.pending.clear();
        line
    }
}

/// UTF-8 decode that never fails.
pub fn decode_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
