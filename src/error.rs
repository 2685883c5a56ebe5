/// Canonical error type used across the decoding pipeline.
///
/// The taxonomy mirrors the failure classes of the stream contract:
/// transport failures are fatal to a stream, frame failures are
/// recovered locally, and everything content-level degrades without
/// ever becoming an error.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A chunk could not be decoded as text. Fatal to the stream.
    #[error("Transport error: {0}")]
    Transport(String),
    /// One frame's payload was not a valid event record. The stream
    /// continues; the raw text is carried for logging/inspection.
    #[error("Frame parse error: {message}")]
    FrameParse { message: String, raw: String },
    #[error("Config error: {0}")]
    Config(String),
}

/// Broad error category, used by callers to decide whether a stream
/// can continue after a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The stream is dead; no further events will arrive.
    Fatal,
    /// One frame was lost; subsequent frames are unaffected.
    Recoverable,
}

impl DecodeError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            DecodeError::Transport(_) | DecodeError::Config(_) => ErrorCategory::Fatal,
            DecodeError::FrameParse { .. } => ErrorCategory::Recoverable,
        }
    }

    /// The offending raw frame text, when the failure preserves one.
    #[must_use]
    pub fn raw_frame(&self) -> Option<&str> {
        match self {
            DecodeError::FrameParse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_parse_is_recoverable_and_keeps_raw() {
        let err = DecodeError::FrameParse {
            message: "bad json".to_string(),
            raw: "data: {oops".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Recoverable);
        assert_eq!(err.raw_frame(), Some("data: {oops"));
    }

    #[test]
    fn transport_is_fatal() {
        let err = DecodeError::Transport("invalid utf-8".to_string());
        assert_eq!(err.category(), ErrorCategory::Fatal);
        assert!(err.raw_frame().is_none());
    }
}
