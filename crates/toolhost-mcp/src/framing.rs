//! Newline-delimited message framing.
//!
//! Bytes arrive in arbitrary chunks: one read may hold half a message or
//! several. [`LineFramer`] accumulates them and yields one frame per `\n`,
//! never parsing a line before its delimiter has arrived.

/// Incremental splitter for `\n`-terminated frames.
///
/// Frames are sliced out behind a consumed offset; the buffer is compacted
/// once per drained batch rather than once per frame.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
    /// Start of the first byte not yet returned as part of a frame.
    consumed: usize,
    /// Bytes before this offset are known to contain no delimiter.
    scan_from: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream.
    pub fn push(&mut self, bytes: &[u8]) {
        self.compact();
        self.buf.extend_from_slice(bytes);
    }

    /// Take the next complete frame, without its delimiter.
    ///
    /// A trailing `\r` is stripped and blank lines are skipped.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            let offset = self.buf[self.scan_from..].iter().position(|&b| b == b'\n');
            let Some(offset) = offset else {
                self.scan_from = self.buf.len();
                self.compact();
                return None;
            };

            let end = self.scan_from + offset;
            let mut line = &self.buf[self.consumed..end];
            self.consumed = end + 1;
            self.scan_from = self.consumed;

            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Some(line.to_vec());
        }
    }

    /// Bytes received after the last delimiter.
    pub fn pending(&self) -> &[u8] {
        &self.buf[self.consumed..]
    }

    /// Drop consumed bytes from the front of the buffer.
    fn compact(&mut self) {
        if self.consumed > 0 {
            self.buf.drain(..self.consumed);
            self.scan_from -= self.consumed;
            self.consumed = 0;
        }
    }
}
