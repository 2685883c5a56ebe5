/// Event parser — turns one frame's payload text into a typed event.
///
/// A frame is one `data:`-marked unit; its remainder is a JSON record
/// whose `type` field selects the event kind. Unknown kinds are decode
/// errors, not silently dropped frames: downstream consumers rely on
/// the enumerated vocabulary being closed.
use crate::error::DecodeError;
use crate::stream::frame::{Frame, FRAME_MARKER};
use serde::{Deserialize, Serialize};

/// One typed event decoded from the agent stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A slice of assistant text (the "reasoning-bearing" payload that
    /// later runs through the segmenter).
    Thought {
        #[serde(default)]
        content: String,
    },
    /// The agent started a tool invocation.
    ToolCall {
        #[serde(default)]
        tool_name: Option<String>,
        #[serde(default)]
        tool_args: serde_json::Map<String, serde_json::Value>,
    },
    /// A tool finished; historical backends put strings or structured
    /// objects in `tool_output`, so it stays an open JSON value here.
    ToolResult {
        #[serde(default)]
        tool_name: Option<String>,
        #[serde(default)]
        tool_output: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
    /// The assembled response once the turn completes.
    FinalResponse {
        #[serde(default)]
        content: String,
    },
    /// A stream-level failure reported by the backend.
    Error {
        #[serde(default)]
        message: String,
    },
}

impl StreamEvent {
    /// Stable wire name of the event kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Thought { .. } => "thought",
            StreamEvent::ToolCall { .. } => "tool_call",
            StreamEvent::ToolResult { .. } => "tool_result",
            StreamEvent::FinalResponse { .. } => "final_response",
            StreamEvent::Error { .. } => "error",
        }
    }
}

/// Parse one frame into at most one event.
///
/// Returns:
/// - `Some(Ok(event))` for a well-formed frame
/// - `Some(Err(..))` when the frame carried the marker but its payload
///   was not a valid event record — the caller reports it and keeps
///   going, the stream is not aborted
/// - `None` for frames without the marker (transport noise; logged and
///   ignored)
///
/// Strictly one frame in, zero or one event out, synchronously; no
/// buffering, no reordering.
#[must_use]
pub fn parse_frame(frame: &Frame) -> Option<Result<StreamEvent, DecodeError>> {
    let payload = extract_payload(&frame.payload)?;
    match serde_json::from_str::<StreamEvent>(&payload) {
        Ok(event) => Some(Ok(event)),
        Err(e) => Some(Err(DecodeError::FrameParse {
            message: e.to_string(),
            raw: frame.payload.clone(),
        })),
    }
}

/// Join the marked lines of a frame into its JSON payload.
///
/// Multi-line payloads (several `data:` lines) are joined with `\n`;
/// comment lines (leading `:`) are skipped. A frame with no marked
/// line at all yields `None`.
fn extract_payload(raw: &str) -> Option<String> {
    let mut payload: Option<String> = None;
    for line in raw.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with(':') {
            continue;
        }
        let Some(value) = line.strip_prefix(FRAME_MARKER) else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match payload.as_mut() {
            Some(buf) => {
                buf.push('\n');
                buf.push_str(value);
            }
            None => payload = Some(value.to_string()),
        }
    }
    if payload.is_none() {
        tracing::debug!(frame = raw, "ignoring frame without data marker");
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(payload: &str) -> Frame {
        Frame {
            payload: payload.to_string(),
            ordinal: 0,
        }
    }

    #[test]
    fn parses_thought_event() {
        let parsed = parse_frame(&frame(r#"data: {"type":"thought","content":"step one"}"#));
        let event = parsed.unwrap().unwrap();
        assert_eq!(
            event,
            StreamEvent::Thought {
                content: "step one".to_string()
            }
        );
        assert_eq!(event.kind(), "thought");
    }

    #[test]
    fn parses_tool_call_with_args() {
        let raw = r#"data: {"type":"tool_call","tool_name":"web-search","tool_args":{"query":"rust"}}"#;
        let event = parse_frame(&frame(raw)).unwrap().unwrap();
        match event {
            StreamEvent::ToolCall {
                tool_name,
                tool_args,
            } => {
                assert_eq!(tool_name.as_deref(), Some("web-search"));
                assert_eq!(tool_args.get("query"), Some(&json!("rust")));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parses_tool_result_defaults() {
        let event = parse_frame(&frame(r#"data: {"type":"tool_result"}"#))
            .unwrap()
            .unwrap();
        match event {
            StreamEvent::ToolResult {
                tool_name,
                tool_output,
                is_error,
            } => {
                assert!(tool_name.is_none());
                assert!(tool_output.is_null());
                assert!(!is_error);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_a_decode_error() {
        let parsed = parse_frame(&frame(r#"data: {"type":"telemetry","blob":1}"#));
        let err = parsed.unwrap().unwrap_err();
        assert_eq!(
            err.raw_frame(),
            Some(r#"data: {"type":"telemetry","blob":1}"#)
        );
    }

    #[test]
    fn malformed_json_is_a_decode_error_with_raw_text() {
        let parsed = parse_frame(&frame("data: {\"type\":\"thought\""));
        assert!(matches!(
            parsed,
            Some(Err(DecodeError::FrameParse { .. }))
        ));
    }

    #[test]
    fn unmarked_frame_is_ignored() {
        assert!(parse_frame(&frame("ping")).is_none());
        assert!(parse_frame(&frame(": keepalive comment")).is_none());
    }

    #[test]
    fn multiline_payload_joined_before_parse() {
        let raw = "data: {\"type\":\"final_response\",\ndata: \"content\":\"done\"}";
        let event = parse_frame(&frame(raw)).unwrap().unwrap();
        assert_eq!(
            event,
            StreamEvent::FinalResponse {
                content: "done".to_string()
            }
        );
    }

    #[test]
    fn marker_without_space_is_accepted() {
        let event = parse_frame(&frame(r#"data:{"type":"error","message":"boom"}"#))
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            StreamEvent::Error {
                message: "boom".to_string()
            }
        );
    }
}
