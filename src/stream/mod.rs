pub mod frame;

pub use frame::{Flush, Frame, FrameDecoder, FRAME_MARKER};

use crate::error::DecodeError;
use crate::event::{parse_frame, StreamEvent};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use smallvec::SmallVec;
use tokio_util::sync::CancellationToken;

/// Observer for one decoded stream.
///
/// Lifecycle contract: `on_open` fires once before any event;
/// `on_close` fires exactly once, on every exit path (natural end,
/// cancellation, fatal transport error); `on_error` fires zero or more
/// times, each carrying one failure. Events arrive in strict
/// byte-stream arrival order.
pub trait StreamObserver {
    fn on_open(&mut self) {}
    fn on_event(&mut self, event: StreamEvent);
    fn on_error(&mut self, error: DecodeError) {
        let _ = error;
    }
    fn on_close(&mut self) {}
}

/// Drive one byte stream through the full decode pipeline.
///
/// This is the single read loop of the pipeline: it awaits the next
/// chunk (the only suspension point), decodes it synchronously, hands
/// events to the observer, and yields back to the caller. Cancellation
/// is checked at the read boundary; once the token fires, no further
/// reads are issued and buffered partial frames are dropped.
///
/// Transport failures (a chunk that is not valid text, or a stream
/// error item) are reported once via `on_error` and end the stream.
/// Per-frame parse failures are reported and the loop continues.
pub async fn pump_stream<S, E, H>(byte_stream: S, observer: &mut H, cancel: &CancellationToken)
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
    H: StreamObserver + ?Sized,
{
    let mut byte_stream = std::pin::pin!(byte_stream);
    let mut decoder = FrameDecoder::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut frames: Vec<Frame> = Vec::with_capacity(8);

    observer.on_open();

    let ended_naturally = loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break false,
            next = byte_stream.next() => next,
        };

        let Some(item) = next else { break true };
        let bytes = match item {
            Ok(bytes) => bytes,
            Err(e) => {
                observer.on_error(DecodeError::Transport(e.to_string()));
                break false;
            }
        };

        match decode_utf8_carry(&mut pending, &bytes) {
            Ok(Some(text)) => decoder.feed_into(&text, &mut frames),
            Ok(None) => {}
            Err(err) => {
                observer.on_error(err);
                break false;
            }
        }

        for frame in frames.drain(..) {
            dispatch_frame(&frame, observer);
        }
    };

    if ended_naturally {
        if !pending.is_empty() {
            observer.on_error(DecodeError::Transport(
                "stream ended mid-character (truncated utf-8 sequence)".to_string(),
            ));
        } else {
            match decoder.finish() {
                Flush::Frame(frame) => dispatch_frame(&frame, observer),
                Flush::Leftover(text) => {
                    tracing::warn!(len = text.len(), "discarding undecodable stream leftover");
                }
                Flush::Clean => {}
            }
        }
    }

    observer.on_close();
}

fn dispatch_frame<H: StreamObserver + ?Sized>(frame: &Frame, observer: &mut H) {
    match parse_frame(frame) {
        Some(Ok(event)) => observer.on_event(event),
        Some(Err(err)) => observer.on_error(err),
        None => {}
    }
}

/// Decode one chunk as UTF-8, carrying an incomplete trailing sequence
/// in `pending` across calls. A sequence that is invalid (not merely
/// incomplete) is a transport failure.
fn decode_utf8_carry(pending: &mut Vec<u8>, bytes: &[u8]) -> Result<Option<String>, DecodeError> {
    if pending.is_empty() {
        match std::str::from_utf8(bytes) {
            Ok(text) => return Ok(Some(text.to_string())),
            Err(e) if e.error_len().is_some() => {
                return Err(DecodeError::Transport(format!(
                    "chunk is not valid utf-8: {e}"
                )));
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                pending.extend_from_slice(&bytes[valid_up_to..]);
                if valid_up_to == 0 {
                    return Ok(None);
                }
                // The prefix was just validated.
                return Ok(std::str::from_utf8(&bytes[..valid_up_to])
                    .ok()
                    .map(str::to_string));
            }
        }
    }

    pending.extend_from_slice(bytes);
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_string();
            pending.clear();
            Ok(Some(text))
        }
        Err(e) if e.error_len().is_some() => Err(DecodeError::Transport(format!(
            "chunk is not valid utf-8: {e}"
        ))),
        Err(e) => {
            let valid_up_to = e.valid_up_to();
            if valid_up_to == 0 {
                return Ok(None);
            }
            let text = std::str::from_utf8(&pending[..valid_up_to])
                .ok()
                .map(str::to_string);
            let tail_len = pending.len() - valid_up_to;
            pending.copy_within(valid_up_to.., 0);
            pending.truncate(tail_len);
            Ok(text)
        }
    }
}

struct PendingFrames {
    frames: SmallVec<[Frame; 8]>,
    head: usize,
}

impl PendingFrames {
    fn new() -> Self {
        Self {
            frames: SmallVec::new(),
            head: 0,
        }
    }

    fn pop_front(&mut self) -> Option<Frame> {
        if self.head >= self.frames.len() {
            return None;
        }
        let frame = std::mem::replace(
            &mut self.frames[self.head],
            Frame {
                payload: String::new(),
                ordinal: 0,
            },
        );
        self.head += 1;
        if self.head == self.frames.len() {
            self.frames.clear();
            self.head = 0;
        }
        Some(frame)
    }

    fn extend_from_vec(&mut self, parsed: &mut Vec<Frame>) {
        if !parsed.is_empty() {
            self.frames.extend(parsed.drain(..));
        }
    }
}

/// Split a byte stream into decoded [`Frame`]s.
///
/// Lazy adapter form of the decoder for callers that want a
/// `Stream<Item = Frame>` instead of the observer-driven pump. Invalid
/// UTF-8 ends the stream (after a warning); the end-of-stream flush
/// follows the same marker rule as [`FrameDecoder::finish`].
pub fn frame_stream<S, E>(byte_stream: S) -> impl Stream<Item = Frame> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Debug + Send + 'static,
{
    enum State {
        Running,
        Flushed,
    }

    futures_util::stream::unfold(
        (
            Box::pin(byte_stream),
            FrameDecoder::new(),
            Vec::<u8>::new(),
            Vec::<Frame>::with_capacity(8),
            PendingFrames::new(),
            State::Running,
        ),
        |(mut stream, mut decoder, mut pending_bytes, mut parsed, mut pending, mut state)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    return Some((
                        frame,
                        (stream, decoder, pending_bytes, parsed, pending, state),
                    ));
                }
                if matches!(state, State::Flushed) {
                    return None;
                }

                match stream.as_mut().next().await {
                    Some(Ok(bytes)) => {
                        match decode_utf8_carry(&mut pending_bytes, &bytes) {
                            Ok(Some(text)) => decoder.feed_into(&text, &mut parsed),
                            Ok(None) => {}
                            Err(err) => {
                                tracing::warn!(%err, "frame stream ended on transport failure");
                                return None;
                            }
                        }
                        pending.extend_from_vec(&mut parsed);
                    }
                    Some(Err(e)) => {
                        tracing::warn!(?e, "frame stream ended on transport error");
                        return None;
                    }
                    None => {
                        state = State::Flushed;
                        if let Flush::Frame(frame) = decoder.finish() {
                            return Some((
                                frame,
                                (stream, decoder, pending_bytes, parsed, pending, state),
                            ));
                        }
                    }
                }
            }
        },
    )
}
