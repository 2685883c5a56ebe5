pub mod consolidated;
pub mod legacy;
pub mod think;

use std::collections::BTreeMap;

use memchr::memchr;

use crate::config::{ConfigError, SegmenterConfig};
use crate::config::validation::validate_config;
use crate::util::{find_close_tag, tag_name_at};

/// One ordered piece of a segmented message, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSegment {
    /// Plain prose, verbatim from the source text.
    Text { text: String },
    /// Inline reasoning content (legacy dialect only; the consolidated
    /// dialect expects reasoning to be extracted before segmentation).
    Reasoning { reasoning: String },
    /// A structured tool invocation.
    ToolInvocation(ToolInvocation),
    /// The user-facing question tag: prose plus attachment references.
    Ask {
        content: String,
        attachments: Vec<String>,
    },
    /// Transient placeholder for a tool whose tag is still streaming in.
    PendingTool { name: String },
}

/// A recognized tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub name: String,
    /// The exact source span the invocation was parsed from.
    pub raw_tag: String,
    pub parameters: BTreeMap<String, String>,
}

/// Parameter key holding a legacy tag's inner text.
pub const INNER_CONTENT_KEY: &str = "content";

impl ToolInvocation {
    /// The single most representative argument for compact display:
    /// first hit in the configured priority list, else the tag's inner
    /// text.
    #[must_use]
    pub fn primary_parameter(&self, priority: &[String]) -> Option<&str> {
        priority
            .iter()
            .find_map(|key| self.parameters.get(key.as_str()))
            .or_else(|| self.parameters.get(INNER_CONTENT_KEY))
            .map(String::as_str)
    }
}

/// The two mutually exclusive tag grammars, resolved once per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Each invocation is its own top-level tag mixed into prose.
    Legacy,
    /// Invocations live inside a fixed wrapper tag.
    Consolidated,
}

/// Per-call context for segmentation.
#[derive(Debug, Clone, Copy)]
pub struct SegmentContext<'a> {
    /// Identifier of the message being segmented, for log correlation.
    pub message_id: &'a str,
    /// When true, reasoning tags were already pulled out upstream and
    /// must not be special-cased again; any stragglers stay prose.
    pub reasoning_extracted: bool,
    /// False while the message is still streaming in; enables the
    /// pending-tool placeholder for an unterminated trailing tag.
    pub finalized: bool,
}

impl<'a> SegmentContext<'a> {
    #[must_use]
    pub fn finalized(message_id: &'a str) -> Self {
        Self {
            message_id,
            reasoning_extracted: false,
            finalized: true,
        }
    }

    #[must_use]
    pub fn streaming(message_id: &'a str) -> Self {
        Self {
            message_id,
            reasoning_extracted: false,
            finalized: false,
        }
    }
}

/// The tool-call tokenizer.
///
/// Pure with respect to its input: no state is retained between calls,
/// so one segmenter can serve any number of concurrent render passes.
/// Segmentation never fails; the worst case for malformed input is the
/// whole text coming back as a single prose segment.
pub struct Segmenter {
    config: SegmenterConfig,
    wrapper_open: String,
    wrapper_close: String,
    invoke_open: String,
}

impl Segmenter {
    /// Build a segmenter over a validated tag configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when the config is invalid.
    pub fn new(config: SegmenterConfig) -> Result<Self, ConfigError> {
        validate_config(&config)?;
        let wrapper_open = format!("<{}>", config.wrapper_tag);
        let wrapper_close = format!("</{}>", config.wrapper_tag);
        let invoke_open = format!("<{}", config.invoke_tag);
        Ok(Self {
            config,
            wrapper_open,
            wrapper_close,
            invoke_open,
        })
    }

    #[must_use]
    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Decide the dialect for one message: consolidated iff a complete
    /// wrapper span encloses at least one invocation sub-tag. Decided
    /// once here, never re-checked per tag, so one message is never
    /// interpreted under both grammars.
    #[must_use]
    pub fn detect_dialect(&self, text: &str) -> Dialect {
        let mut cursor = 0usize;
        while let Some(rel) = memchr::memmem::find(text[cursor..].as_bytes(), self.wrapper_open.as_bytes())
        {
            let content_start = cursor + rel + self.wrapper_open.len();
            let Some(close_rel) =
                memchr::memmem::find(text[content_start..].as_bytes(), self.wrapper_close.as_bytes())
            else {
                break;
            };
            let inner = &text[content_start..content_start + close_rel];
            if memchr::memmem::find(inner.as_bytes(), self.invoke_open.as_bytes()).is_some() {
                return Dialect::Consolidated;
            }
            cursor = content_start + close_rel + self.wrapper_close.len();
        }
        Dialect::Legacy
    }

    /// Split one message's text into ordered content segments.
    ///
    /// Blank input yields an empty list. For streaming input
    /// (`ctx.finalized == false`), everything from the earliest
    /// unterminated allow-listed opening tag onward is replaced by a
    /// [`ContentSegment::PendingTool`] placeholder.
    #[must_use]
    pub fn segment(&self, text: &str, ctx: &SegmentContext<'_>) -> Vec<ContentSegment> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let (body, pending) = if ctx.finalized {
            (text, None)
        } else {
            match self.find_streaming_cut(text) {
                Some((cut, name)) => (&text[..cut], Some(name)),
                None => (text, None),
            }
        };

        let dialect = self.detect_dialect(body);
        tracing::debug!(
            message_id = ctx.message_id,
            ?dialect,
            pending = pending.is_some(),
            "segmenting message text"
        );

        let mut segments = match dialect {
            Dialect::Legacy => legacy::segment(body, &self.config, !ctx.reasoning_extracted),
            Dialect::Consolidated => consolidated::segment(body, &self.config),
        };

        if let Some(name) = pending {
            segments.push(ContentSegment::PendingTool { name });
        }
        segments
    }

    /// Find the earliest opening tag that is allow-listed for streaming
    /// display and has no close yet. Only tags with unambiguous prior
    /// signatures participate; arbitrary unterminated tags stay prose.
    fn find_streaming_cut(&self, text: &str) -> Option<(usize, String)> {
        let bytes = text.as_bytes();
        let mut cursor = 0usize;
        while let Some(rel) = memchr(b'<', &bytes[cursor..]) {
            let lt = cursor + rel;
            let Some(name) = tag_name_at(text, lt + 1) else {
                cursor = lt + 1;
                continue;
            };
            let allow_listed = self.config.streaming_tags.contains(name)
                || name == self.config.wrapper_tag;
            if !allow_listed {
                cursor = lt + 1;
                continue;
            }
            if !self.open_tag_is_terminated(text, lt, name) {
                return Some((lt, name.to_string()));
            }
            cursor = lt + 1;
        }
        None
    }

    fn open_tag_is_terminated(&self, text: &str, lt: usize, name: &str) -> bool {
        let bytes = text.as_bytes();
        let Some(gt_rel) = memchr(b'>', &bytes[lt..]) else {
            // Open tag itself is cut off mid-stream.
            return false;
        };
        let gt = lt + gt_rel;
        if bytes.get(gt.wrapping_sub(1)) == Some(&b'/') {
            return true;
        }
        find_close_tag(text, name, gt + 1).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> Segmenter {
        Segmenter::new(SegmenterConfig::default()).unwrap()
    }

    #[test]
    fn blank_input_yields_no_segments() {
        let seg = segmenter();
        assert!(seg.segment("", &SegmentContext::finalized("m1")).is_empty());
        assert!(seg
            .segment("   \n\t ", &SegmentContext::finalized("m1"))
            .is_empty());
    }

    #[test]
    fn plain_text_yields_single_text_segment() {
        let seg = segmenter();
        let segments = seg.segment("just prose, no tags", &SegmentContext::finalized("m1"));
        assert_eq!(
            segments,
            vec![ContentSegment::Text {
                text: "just prose, no tags".to_string()
            }]
        );
    }

    #[test]
    fn dialect_detection_requires_invoke_inside_wrapper() {
        let seg = segmenter();
        assert_eq!(
            seg.detect_dialect("<function_calls><invoke name=\"x\"/></function_calls>"),
            Dialect::Consolidated
        );
        // Empty wrapper falls back to legacy.
        assert_eq!(
            seg.detect_dialect("<function_calls></function_calls>"),
            Dialect::Legacy
        );
        // Unterminated wrapper is not consolidated.
        assert_eq!(
            seg.detect_dialect("<function_calls><invoke name=\"x\"/>"),
            Dialect::Legacy
        );
        assert_eq!(seg.detect_dialect("plain"), Dialect::Legacy);
    }

    #[test]
    fn streaming_placeholder_for_unterminated_allowlisted_tag() {
        let seg = segmenter();
        let segments = seg.segment(
            "Running it now <execute-command>ls -l",
            &SegmentContext::streaming("m1"),
        );
        assert_eq!(
            segments,
            vec![
                ContentSegment::Text {
                    text: "Running it now ".to_string()
                },
                ContentSegment::PendingTool {
                    name: "execute-command".to_string()
                },
            ]
        );
    }

    #[test]
    fn streaming_placeholder_for_unterminated_wrapper() {
        let seg = segmenter();
        let segments = seg.segment(
            "On it. <function_calls><invoke name=\"web_search\">",
            &SegmentContext::streaming("m1"),
        );
        assert_eq!(
            segments,
            vec![
                ContentSegment::Text {
                    text: "On it. ".to_string()
                },
                ContentSegment::PendingTool {
                    name: "function_calls".to_string()
                },
            ]
        );
    }

    #[test]
    fn streaming_ignores_unlisted_unterminated_tags() {
        let seg = segmenter();
        let segments = seg.segment(
            "see <footnote>still open",
            &SegmentContext::streaming("m1"),
        );
        assert_eq!(
            segments,
            vec![ContentSegment::Text {
                text: "see <footnote>still open".to_string()
            }]
        );
    }

    #[test]
    fn finalized_input_never_emits_placeholder() {
        let seg = segmenter();
        let segments = seg.segment(
            "text <execute-command>ls",
            &SegmentContext::finalized("m1"),
        );
        assert_eq!(
            segments,
            vec![ContentSegment::Text {
                text: "text <execute-command>ls".to_string()
            }]
        );
    }

    #[test]
    fn completed_tag_does_not_trigger_placeholder_while_streaming() {
        let seg = segmenter();
        let segments = seg.segment(
            "<execute-command>ls</execute-command> done, next up",
            &SegmentContext::streaming("m1"),
        );
        assert!(matches!(
            segments[0],
            ContentSegment::ToolInvocation(_)
        ));
        assert_eq!(
            segments[1],
            ContentSegment::Text {
                text: " done, next up".to_string()
            }
        );
    }

    #[test]
    fn primary_parameter_prefers_priority_then_inner_content() {
        let priority = SegmenterConfig::default().primary_param_priority;
        let mut parameters = BTreeMap::new();
        parameters.insert("query".to_string(), "rust".to_string());
        parameters.insert(INNER_CONTENT_KEY.to_string(), "body".to_string());
        let invocation = ToolInvocation {
            name: "web-search".to_string(),
            raw_tag: String::new(),
            parameters,
        };
        assert_eq!(invocation.primary_parameter(&priority), Some("rust"));

        let mut parameters = BTreeMap::new();
        parameters.insert(INNER_CONTENT_KEY.to_string(), "ls -la".to_string());
        let invocation = ToolInvocation {
            name: "execute-command".to_string(),
            raw_tag: String::new(),
            parameters,
        };
        assert_eq!(invocation.primary_parameter(&priority), Some("ls -la"));
    }
}
