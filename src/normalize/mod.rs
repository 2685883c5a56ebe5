/// Tool-result normalization — collapse every historical result shape
/// into one canonical record.
///
/// Stored conversations span several generations of the wire protocol,
/// and all of them must keep normalizing indefinitely. The cascade
/// below is an ordered list of shape extractors, first match wins;
/// new legacy shapes get appended without disturbing the ones before
/// them, and each is unit-testable on its own.
use serde_json::{Map, Value};

/// The normalized, shape-independent representation of one tool
/// execution outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalToolResult {
    /// Display form: word separator `-`.
    pub tool_name: String,
    /// Identifier form: word separator `_`. Always the separator
    /// transform of `tool_name`, never derived independently.
    pub function_name: String,
    pub xml_tag_name: Option<String>,
    pub tool_output: String,
    /// Optimistic default: false only when the source payload says so
    /// explicitly. Older stored results carry no success marker at all
    /// and must keep reading as successful.
    pub is_success: bool,
    pub arguments: Option<Map<String, Value>>,
    pub timestamp: Option<String>,
    pub tool_call_id: Option<String>,
    pub summary: Option<String>,
}

/// Convert a tool/function name to display form (`web_search` →
/// `web-search`). Pure separator substitution; round-tripping through
/// [`identifier_name`] is a fixed point.
#[must_use]
pub fn display_name(name: &str) -> String {
    name.replace('_', "-")
}

/// Convert a tool/function name to identifier form (`web-search` →
/// `web_search`).
#[must_use]
pub fn identifier_name(name: &str) -> String {
    name.replace('-', "_")
}

impl CanonicalToolResult {
    /// Seed a record from one source name; both name forms are derived
    /// from it by the separator transform.
    fn from_name(name: &str) -> Self {
        Self {
            tool_name: display_name(name),
            function_name: identifier_name(name),
            xml_tag_name: None,
            tool_output: String::new(),
            is_success: true,
            arguments: None,
            timestamp: None,
            tool_call_id: None,
            summary: None,
        }
    }

    /// Re-encode this record in the modern execution-envelope shape.
    /// Normalizing the result is the identity on the core fields.
    #[must_use]
    pub fn to_execution_envelope(&self) -> Value {
        let mut env = Map::new();
        env.insert(
            "function_name".to_string(),
            Value::String(self.function_name.clone()),
        );
        if let Some(tag) = &self.xml_tag_name {
            env.insert("xml_tag_name".to_string(), Value::String(tag.clone()));
        }
        let mut result = Map::new();
        result.insert("success".to_string(), Value::Bool(self.is_success));
        result.insert(
            "output".to_string(),
            Value::String(self.tool_output.clone()),
        );
        env.insert("result".to_string(), Value::Object(result));
        if let Some(arguments) = &self.arguments {
            env.insert("arguments".to_string(), Value::Object(arguments.clone()));
        }
        if let Some(id) = &self.tool_call_id {
            env.insert("tool_call_id".to_string(), Value::String(id.clone()));
        }
        if let Some(timestamp) = &self.timestamp {
            env.insert("timestamp".to_string(), Value::String(timestamp.clone()));
        }
        let mut outer = Map::new();
        outer.insert("tool_execution".to_string(), Value::Object(env));
        if let Some(summary) = &self.summary {
            outer.insert("summary".to_string(), Value::String(summary.clone()));
        }
        Value::Object(outer)
    }
}

type ShapeExtractor = fn(&Map<String, Value>) -> Option<CanonicalToolResult>;

/// The first-match-wins cascade, most specific shape first.
const SHAPES: &[(&str, ShapeExtractor)] = &[
    ("execution_envelope", from_execution_envelope),
    ("message_envelope", from_message_envelope),
    ("legacy_flat", from_legacy_flat),
    ("direct_output", from_direct_output),
    ("opaque_object", from_opaque_object),
];

/// Normalize one raw result payload of unknown shape.
///
/// Returns `None` when nothing recognizable is present (null, numbers,
/// arrays); every non-null object normalizes to *something*, worst
/// case the opaque fallback.
#[must_use]
pub fn normalize_tool_result(raw: &Value) -> Option<CanonicalToolResult> {
    match raw {
        Value::String(s) => normalize_tool_result_str(s),
        Value::Object(obj) => {
            for (shape, extract) in SHAPES {
                if let Some(result) = extract(obj) {
                    tracing::trace!(shape, "normalized tool result");
                    return Some(result);
                }
            }
            None
        }
        _ => None,
    }
}

/// Normalize a string payload: structured payloads are parsed and fed
/// back through the object cascade, everything else takes the legacy
/// inline-format path.
#[must_use]
pub fn normalize_tool_result_str(raw: &str) -> Option<CanonicalToolResult> {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        if value.is_object() {
            return normalize_tool_result(&value);
        }
    }
    Some(from_inline_string(raw))
}

// ---------------------------------------------------------------------------
// Shape extractors
// ---------------------------------------------------------------------------

/// Legacy inline format: the whole string is the output; a leading
/// `<tag>…</tag>` pair names the tool and a `ToolResult(success=…)`
/// phrase carries the only explicit success marker this format ever
/// had.
fn from_inline_string(raw: &str) -> CanonicalToolResult {
    let name = detect_inline_tag(raw).unwrap_or("unknown");
    let mut result = CanonicalToolResult::from_name(name);
    if name != "unknown" {
        result.xml_tag_name = Some(name.to_string());
    }
    result.tool_output = raw.to_string();
    result.is_success = inline_success_marker(raw).unwrap_or(true);
    result
}

fn detect_inline_tag(raw: &str) -> Option<&str> {
    use memchr::memchr;

    let bytes = raw.as_bytes();
    let mut cursor = 0usize;
    while let Some(rel) = memchr(b'<', &bytes[cursor..]) {
        let lt = cursor + rel;
        if let Some(name) = crate::util::tag_name_at(raw, lt + 1) {
            let after = lt + 1 + name.len();
            if bytes.get(after) == Some(&b'>')
                && crate::util::find_close_tag(raw, name, after + 1).is_some()
            {
                return Some(name);
            }
        }
        cursor = lt + 1;
    }
    None
}

fn inline_success_marker(raw: &str) -> Option<bool> {
    let phrase_at = raw.find("ToolResult(")?;
    let tail = &raw[phrase_at..];
    let marker_at = tail.find("success=")?;
    let value = tail[marker_at + "success=".len()..].trim_start();
    if value.starts_with("False") || value.starts_with("false") {
        Some(false)
    } else if value.starts_with("True") || value.starts_with("true") {
        Some(true)
    } else {
        None
    }
}

/// Modern shape: `{ tool_execution: { function_name, xml_tag_name?,
/// result: { success?, output? }, arguments?, tool_call_id? } }`.
fn from_execution_envelope(obj: &Map<String, Value>) -> Option<CanonicalToolResult> {
    let env = obj.get("tool_execution")?.as_object()?;

    let function_name = env
        .get("function_name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty());
    let xml_tag_name = env
        .get("xml_tag_name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty());
    // The tag name wins for display when both are present.
    let source = xml_tag_name.or(function_name).unwrap_or("unknown");

    let mut result = CanonicalToolResult::from_name(source);
    result.xml_tag_name = xml_tag_name.map(str::to_string);

    let exec_result = env.get("result");
    result.tool_output = extract_output(exec_result, None);
    result.is_success = success_flag(exec_result.and_then(|r| r.get("success")));
    result.arguments = env
        .get("arguments")
        .and_then(Value::as_object)
        .cloned();
    result.tool_call_id = string_field(env, "tool_call_id");
    result.timestamp = string_field(env, "timestamp")
        .or_else(|| exec_result.and_then(|r| string_field(r.as_object()?, "timestamp")));
    result.summary = string_field(obj, "summary").or_else(|| string_field(env, "summary"));
    Some(result)
}

/// Generic message envelope: `{ role, content }` where content is
/// either a nested structured result or an inline string.
fn from_message_envelope(obj: &Map<String, Value>) -> Option<CanonicalToolResult> {
    if !obj.contains_key("role") {
        return None;
    }
    match obj.get("content")? {
        Value::Object(inner) => {
            from_execution_envelope(inner).or_else(|| from_named_flat(inner))
        }
        Value::String(inner) => normalize_tool_result_str(inner),
        _ => None,
    }
}

/// Legacy flat shape: `tool_name` / `xml_tag_name` at top level, output
/// under `result.output`, `result`, or a direct `output` field.
fn from_legacy_flat(obj: &Map<String, Value>) -> Option<CanonicalToolResult> {
    from_named_flat(obj)
}

fn from_named_flat(obj: &Map<String, Value>) -> Option<CanonicalToolResult> {
    let tool_name = obj
        .get("tool_name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty());
    let xml_tag_name = obj
        .get("xml_tag_name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty());
    let source = xml_tag_name.or(tool_name)?;

    let mut result = CanonicalToolResult::from_name(source);
    result.xml_tag_name = xml_tag_name.map(str::to_string);

    let flat_result = obj.get("result");
    result.tool_output = extract_output(flat_result, obj.get("output"));
    result.is_success = success_flag(
        flat_result
            .and_then(|r| r.get("success"))
            .or_else(|| obj.get("success")),
    );
    result.arguments = obj.get("arguments").and_then(Value::as_object).cloned();
    result.tool_call_id = string_field(obj, "tool_call_id");
    result.timestamp = string_field(obj, "timestamp");
    result.summary = string_field(obj, "summary");
    Some(result)
}

/// Bare `{ output: "…" }` objects with no other recognized markers.
fn from_direct_output(obj: &Map<String, Value>) -> Option<CanonicalToolResult> {
    let output = obj.get("output")?.as_str()?;
    let mut result = CanonicalToolResult::from_name("unknown");
    result.tool_output = output.to_string();
    result.is_success = success_flag(obj.get("success"));
    result.summary = string_field(obj, "summary");
    Some(result)
}

/// Absolute fallback: any other non-null object is stringified
/// wholesale, so a well-formed payload never normalizes to nothing.
fn from_opaque_object(obj: &Map<String, Value>) -> Option<CanonicalToolResult> {
    let mut result = CanonicalToolResult::from_name("unknown_object");
    result.tool_output =
        serde_json::to_string(&Value::Object(obj.clone())).unwrap_or_default();
    Some(result)
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Output priority: nested `result.output`, then `result` itself when
/// it is a non-empty string, then the caller-supplied direct fallback.
fn extract_output(result: Option<&Value>, direct: Option<&Value>) -> String {
    if let Some(output) = result.and_then(|r| r.get("output")) {
        if let Some(text) = value_as_output(output) {
            return text;
        }
    }
    if let Some(text) = result.and_then(Value::as_str).filter(|s| !s.is_empty()) {
        return text.to_string();
    }
    direct
        .and_then(value_as_output)
        .unwrap_or_default()
}

fn value_as_output(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => serde_json::to_string(other).ok(),
    }
}

/// False only on an explicit `false`. Absence, null, or any other
/// value reads as success.
fn success_flag(value: Option<&Value>) -> bool {
    !matches!(value, Some(Value::Bool(false)))
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn name_forms_round_trip_to_fixed_point() {
        let display = display_name("web_search");
        assert_eq!(display, "web-search");
        let identifier = identifier_name(&display);
        assert_eq!(identifier, "web_search");
        assert_eq!(display_name(&identifier), display);
    }

    #[test]
    fn execution_envelope_with_failure() {
        let raw = json!({
            "tool_execution": {
                "function_name": "web_search",
                "result": { "success": false, "output": "timeout" }
            }
        });
        let result = normalize_tool_result(&raw).unwrap();
        assert_eq!(result.tool_name, "web-search");
        assert_eq!(result.function_name, "web_search");
        assert!(!result.is_success);
        assert_eq!(result.tool_output, "timeout");
    }

    #[test]
    fn execution_envelope_tag_name_wins_for_display() {
        let raw = json!({
            "tool_execution": {
                "function_name": "execute_command",
                "xml_tag_name": "execute-command",
                "result": { "success": true, "output": "done" }
            }
        });
        let result = normalize_tool_result(&raw).unwrap();
        assert_eq!(result.tool_name, "execute-command");
        assert_eq!(result.function_name, "execute_command");
        assert_eq!(result.xml_tag_name.as_deref(), Some("execute-command"));
    }

    #[test]
    fn execution_envelope_result_string_fallback() {
        let raw = json!({
            "tool_execution": {
                "function_name": "web_search",
                "result": "three hits"
            }
        });
        let result = normalize_tool_result(&raw).unwrap();
        assert_eq!(result.tool_output, "three hits");
        assert!(result.is_success);
    }

    #[test]
    fn execution_envelope_optional_fields() {
        let raw = json!({
            "summary": "searched the web",
            "tool_execution": {
                "function_name": "web_search",
                "arguments": { "query": "rust" },
                "tool_call_id": "call_1",
                "timestamp": "2024-06-01T10:00:00Z",
                "result": { "output": "ok" }
            }
        });
        let result = normalize_tool_result(&raw).unwrap();
        assert_eq!(
            result.arguments.as_ref().and_then(|a| a.get("query")),
            Some(&json!("rust"))
        );
        assert_eq!(result.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(result.timestamp.as_deref(), Some("2024-06-01T10:00:00Z"));
        assert_eq!(result.summary.as_deref(), Some("searched the web"));
    }

    #[test]
    fn message_envelope_with_object_content() {
        let raw = json!({
            "role": "tool",
            "content": {
                "tool_execution": {
                    "function_name": "create_file",
                    "result": { "success": true, "output": "created" }
                }
            }
        });
        let result = normalize_tool_result(&raw).unwrap();
        assert_eq!(result.tool_name, "create-file");
        assert_eq!(result.tool_output, "created");
    }

    #[test]
    fn message_envelope_with_legacy_content() {
        let raw = json!({
            "role": "tool",
            "content": {
                "tool_name": "execute-command",
                "output": "total 0"
            }
        });
        let result = normalize_tool_result(&raw).unwrap();
        assert_eq!(result.tool_name, "execute-command");
        assert_eq!(result.function_name, "execute_command");
        assert_eq!(result.tool_output, "total 0");
        assert!(result.is_success);
    }

    #[test]
    fn message_envelope_with_string_content() {
        let raw = json!({
            "role": "tool",
            "content": "<web-search>no results</web-search>"
        });
        let result = normalize_tool_result(&raw).unwrap();
        assert_eq!(result.tool_name, "web-search");
        assert_eq!(result.tool_output, "<web-search>no results</web-search>");
    }

    #[test]
    fn legacy_flat_object() {
        let raw = json!({
            "xml_tag_name": "crawl-webpage",
            "result": { "success": false, "output": "403 forbidden" }
        });
        let result = normalize_tool_result(&raw).unwrap();
        assert_eq!(result.tool_name, "crawl-webpage");
        assert_eq!(result.function_name, "crawl_webpage");
        assert!(!result.is_success);
        assert_eq!(result.tool_output, "403 forbidden");
    }

    #[test]
    fn bare_string_wraps_as_unknown() {
        let result = normalize_tool_result(&json!("42")).unwrap();
        assert_eq!(result.tool_name, "unknown");
        assert_eq!(result.tool_output, "42");
        assert!(result.is_success);
    }

    #[test]
    fn inline_string_with_tag_and_failure_marker() {
        let raw = "<execute-command>ToolResult(success=False, output=\"boom\")</execute-command>";
        let result = normalize_tool_result_str(raw).unwrap();
        assert_eq!(result.tool_name, "execute-command");
        assert_eq!(result.xml_tag_name.as_deref(), Some("execute-command"));
        assert!(!result.is_success);
        assert_eq!(result.tool_output, raw);
    }

    #[test]
    fn inline_string_success_defaults_true_without_marker() {
        let result = normalize_tool_result_str("<web-search>ten hits</web-search>").unwrap();
        assert!(result.is_success);
    }

    #[test]
    fn json_string_payload_goes_through_object_cascade() {
        let raw = r#"{"tool_execution":{"function_name":"web_search","result":{"output":"hi"}}}"#;
        let result = normalize_tool_result_str(raw).unwrap();
        assert_eq!(result.tool_name, "web-search");
        assert_eq!(result.tool_output, "hi");
    }

    #[test]
    fn direct_output_object() {
        let raw = json!({ "output": "plain result", "summary": "short" });
        let result = normalize_tool_result(&raw).unwrap();
        assert_eq!(result.tool_name, "unknown");
        assert_eq!(result.tool_output, "plain result");
        assert_eq!(result.summary.as_deref(), Some("short"));
    }

    #[test]
    fn unmatched_object_falls_back_to_opaque() {
        let raw = json!({ "weird": { "nested": [1, 2, 3] } });
        let result = normalize_tool_result(&raw).unwrap();
        assert_eq!(result.function_name, "unknown_object");
        assert!(result.tool_output.contains("\"nested\""));
        assert!(result.is_success);
    }

    #[test]
    fn null_and_scalars_normalize_to_none() {
        assert!(normalize_tool_result(&Value::Null).is_none());
        assert!(normalize_tool_result(&json!(7)).is_none());
        assert!(normalize_tool_result(&json!([1, 2])).is_none());
    }

    #[test]
    fn normalization_is_idempotent_through_envelope_round_trip() {
        let raw = json!({
            "tool_execution": {
                "function_name": "web_search",
                "xml_tag_name": "web-search",
                "result": { "success": false, "output": "timeout" },
                "tool_call_id": "call_9"
            }
        });
        let first = normalize_tool_result(&raw).unwrap();
        let second = normalize_tool_result(&first.to_execution_envelope()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn absent_success_means_success_in_every_shape() {
        let shapes = [
            json!({ "tool_execution": { "function_name": "t_a", "result": { "output": "x" } } }),
            json!({ "role": "tool", "content": { "tool_name": "t-b", "output": "x" } }),
            json!({ "xml_tag_name": "t-c", "output": "x" }),
            json!({ "output": "x" }),
        ];
        for raw in &shapes {
            let result = normalize_tool_result(raw).unwrap();
            assert!(result.is_success, "shape {raw} should default to success");
        }
    }
}
