/// Frame decoder — reassembles discrete protocol frames out of an
/// incrementally delivered text stream.
///
/// The wire contract is one frame per blank-line-separated unit, each
/// unit prefixed with a fixed `data:` marker. Chunks may arrive at
/// arbitrary boundaries, including mid-frame and mid-delimiter, so the
/// decoder keeps one rolling buffer across calls and only emits a
/// frame once its terminator is fully present.
use memchr::memmem;
use std::sync::LazyLock;

/// One delimiter-bounded unit recovered from the stream.
///
/// `payload` excludes the trailing blank-line terminator. `ordinal` is
/// the frame's position in arrival order; consumers index on it, so
/// frames are never reordered or coalesced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: String,
    pub ordinal: u64,
}

/// Outcome of flushing the decoder at end of stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flush {
    /// Buffer was empty; nothing was lost.
    Clean,
    /// The leftover buffer carried the frame marker and is emitted as a
    /// final, unterminated frame.
    Frame(Frame),
    /// The leftover buffer did not look like a frame. A decode warning
    /// for the caller to log, never an error.
    Leftover(String),
}

/// The fixed per-frame line marker.
pub const FRAME_MARKER: &str = "data:";

/// Incremental frame decoder.
///
/// Feed it text chunks as they arrive; complete frames come out in
/// strict arrival order. Call [`FrameDecoder::finish`] exactly once
/// when the transport reports end of stream.
pub struct FrameDecoder {
    buffer: String,
    scan_from: usize,
    next_ordinal: u64,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            scan_from: 0,
            next_ordinal: 0,
        }
    }

    /// Feed one chunk and return any frames it completed.
    pub fn feed(&mut self, chunk: &str) -> Vec<Frame> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed one chunk, appending completed frames into `out`.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<Frame>) {
        self.buffer.push_str(chunk);
        while let Some((end, delim_len)) =
            find_frame_terminator(self.buffer.as_bytes(), self.scan_from)
        {
            let mut payload: String = self.buffer.drain(..end + delim_len).collect();
            payload.truncate(end);
            self.scan_from = 0;
            // Consecutive delimiters produce empty pieces; they carry
            // nothing and are not frames.
            if !payload.is_empty() {
                out.push(Frame {
                    payload,
                    ordinal: self.next_ordinal,
                });
                self.next_ordinal += 1;
            }
        }
        // Keep a small overlap so a terminator split across chunks is
        // still found on the next feed.
        self.scan_from = self.buffer.len().saturating_sub(3);
    }

    /// Flush the decoder at end of stream.
    ///
    /// A non-empty leftover that carries the frame marker is treated as
    /// a final frame whose terminator was cut off; anything else is
    /// surfaced as [`Flush::Leftover`] so the caller can log it without
    /// crashing.
    pub fn finish(&mut self) -> Flush {
        self.scan_from = 0;
        let leftover = std::mem::take(&mut self.buffer);
        if leftover.is_empty() {
            return Flush::Clean;
        }
        if leftover.trim_start().starts_with(FRAME_MARKER) {
            let frame = Frame {
                payload: leftover,
                ordinal: self.next_ordinal,
            };
            self.next_ordinal += 1;
            return Flush::Frame(frame);
        }
        Flush::Leftover(leftover)
    }

    /// Number of frames emitted so far.
    #[must_use]
    pub fn frames_emitted(&self) -> u64 {
        self.next_ordinal
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Find the earliest frame terminator (`\n\n` or `\r\n\r\n`) at or
/// after `scan_from`. Returns `(payload_end, delimiter_len)`.
fn find_frame_terminator(buffer: &[u8], scan_from: usize) -> Option<(usize, usize)> {
    static LF_LF: LazyLock<memmem::Finder<'static>> =
        LazyLock::new(|| memmem::Finder::new(b"\n\n"));
    static CRLF_CRLF: LazyLock<memmem::Finder<'static>> =
        LazyLock::new(|| memmem::Finder::new(b"\r\n\r\n"));

    let scan_from = scan_from.min(buffer.len());
    let haystack = &buffer[scan_from..];
    let lf = LF_LF.find(haystack).map(|rel| scan_from + rel);
    let crlf = CRLF_CRLF.find(haystack).map(|rel| scan_from + rel);

    match (lf, crlf) {
        (Some(lf_pos), Some(crlf_pos)) if crlf_pos < lf_pos => Some((crlf_pos, 4)),
        (None, Some(crlf_pos)) => Some((crlf_pos, 4)),
        (Some(lf_pos), _) => Some((lf_pos, 2)),
        (None, None) => None,
    }
}
