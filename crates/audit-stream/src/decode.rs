/// Incremental UTF-8 decoder for chunked byte streams.
///
/// A multi-byte character split across two chunks is held back until its last
/// byte arrives. Invalid sequences decode to U+FFFD.
#[derive(Default, Debug)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `chunk`, returning every complete character seen so far.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());
        let mut consumed = 0;
        loop {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    consumed = self.pending.len();
                    break;
                }
                Err(err) => {
                    let valid_up_to = consumed + err.valid_up_to();
                    // from_utf8 already validated this prefix.
                    out.push_str(&String::from_utf8_lossy(
                        &self.pending[consumed..valid_up_to],
                    ));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid_up_to + len;
                        }
                        None => {
                            // Truncated sequence at the end: wait for more bytes.
                            consumed = valid_up_to;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);
        out
    }

    /// Flushes any bytes still held back. An incomplete trailing sequence
    /// becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }

    /// Number of bytes waiting for the rest of their character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_back_split_multibyte_character() {
        let bytes = "né✓".as_bytes();
        let mut decoder = Utf8StreamDecoder::new();
        // 'é' is two bytes starting at 1; split inside it.
        assert_eq!(decoder.decode(&bytes[..2]), "n");
        assert_eq!(decoder.pending_len(), 1);
        assert_eq!(decoder.decode(&bytes[2..4]), "é");
        assert_eq!(decoder.decode(&bytes[4..]), "✓");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn every_split_point_yields_the_same_text() {
        let text = "data: {\"m\":\"über 🚀 ok\"}\n\n";
        let bytes = text.as_bytes();
        for split in 0..=bytes.len() {
            let mut decoder = Utf8StreamDecoder::new();
            let mut out = decoder.decode(&bytes[..split]);
            out.push_str(&decoder.decode(&bytes[split..]));
            out.push_str(&decoder.finish());
            assert_eq!(out, text, "split at {split}");
        }
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.decode(b"a\xFFb"), "a\u{FFFD}b");
        assert_eq!(decoder.decode(b"\xE2\x9C"), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }
}
