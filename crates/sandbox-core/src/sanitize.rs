//! Streaming UTF-8 repair for terminal output.

use std::char::REPLACEMENT_CHARACTER;

/// Turns raw terminal bytes into valid UTF-8 text.
///
/// Malformed sequences become U+FFFD. A multi-byte character split across
/// two chunks is held back until the rest of it arrives, so chunk
/// boundaries never corrupt valid output. At most three bytes are pending
/// at any time.
#[derive(Debug, Default)]
pub struct Utf8Sanitizer {
    pending: Vec<u8>,
}

impl Utf8Sanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk. May return an empty string when the chunk
    /// only holds the start of a character.
    pub fn push(&mut self, chunk: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(chunk);

        let mut out = String::with_capacity(input.len());
        let mut rest = input.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                        None => {
                            self.pending = tail.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush at end of stream. A dangling partial character becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            REPLACEMENT_CHARACTER.to_string()
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
