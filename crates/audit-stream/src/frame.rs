/// Splits `buffer` at blank-line delimiters.
///
/// Returns the complete frames in order and the trailing segment after the
/// last delimiter (possibly empty). Accepts `\n\n`, `\r\n\r\n` and the mixed
/// forms. Payload content is never inspected.
pub fn split_frames(buffer: &str) -> (Vec<&str>, &str) {
    split_frames_from(buffer, 0)
}

/// `split_frames` that starts looking for delimiters at byte `from`.
/// No delimiter may begin before `from`.
fn split_frames_from(buffer: &str, from: usize) -> (Vec<&str>, &str) {
    let bytes = buffer.as_bytes();
    let mut frames = Vec::new();
    let mut start = 0;
    let mut i = from.min(bytes.len());
    while i < bytes.len() {
        if bytes[i] != b'\n' {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        if j < bytes.len() && bytes[j] == b'\r' {
            j += 1;
        }
        if j < bytes.len() && bytes[j] == b'\n' {
            let end = if i > start && bytes[i - 1] == b'\r' {
                i - 1
            } else {
                i
            };
            frames.push(&buffer[start..end]);
            start = j + 1;
            i = start;
        } else {
            i += 1;
        }
    }
    (frames, &buffer[start..])
}

/// Owns the undelivered tail of decoded text for one session.
///
/// Between calls the buffer never holds a complete frame.
#[derive(Default, Debug)]
pub struct FrameSplitter {
    buffer: String,
    /// Offset where the next delimiter search resumes.
    scanned: usize,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `text` and drains every complete frame now in the buffer.
    ///
    /// Frames that are empty or whitespace-only are skipped.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);
        let (frames, tail) = split_frames_from(&self.buffer, self.scanned);
        let frames: Vec<String> = frames
            .into_iter()
            .filter(|frame| !frame.trim().is_empty())
            .map(ToOwned::to_owned)
            .collect();
        let consumed = self.buffer.len() - tail.len();
        self.buffer.drain(..consumed);
        // A delimiter is at most three bytes, so only the last two can start one.
        self.scanned = self.buffer.len().saturating_sub(2);
        frames
    }

    /// Takes the remaining tail as a final frame at end of stream.
    ///
    /// Returns `None` when nothing but whitespace is left.
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        if tail.trim().is_empty() {
            None
        } else {
            Some(tail)
        }
    }

    /// Text received but not yet part of a complete frame.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }
}
