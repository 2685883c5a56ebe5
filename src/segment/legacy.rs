/// Legacy-dialect tokenizer: every invocation is its own top-level tag
/// mixed directly into prose, `<name>…</name>` or `<name …/>`, for any
/// identifier-like tag name.
///
/// Anything that fails to parse as a complete tag stays prose. A
/// wrongly-rendered tool-call card is worse than plain text, so every
/// malformed span degrades to a text segment instead of erroring.
use std::collections::BTreeMap;

use memchr::memchr;

use crate::config::SegmenterConfig;
use crate::util::{extract_attr, find_close_tag, parse_attrs, tag_name_at};

use super::{ContentSegment, ToolInvocation, INNER_CONTENT_KEY};

/// Attribute carrying comma-separated attachment references on the ask
/// tag.
const ATTACHMENTS_ATTR: &str = "attachments";

/// Segment `text` under the legacy grammar.
///
/// `reasoning_inline` controls whether the reasoning tag becomes a
/// [`ContentSegment::Reasoning`] segment; when reasoning was already
/// extracted upstream it is left in the prose instead, so it is never
/// special-cased twice.
pub(crate) fn segment(
    text: &str,
    config: &SegmenterConfig,
    reasoning_inline: bool,
) -> Vec<ContentSegment> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut last_end = 0usize;
    let mut cursor = 0usize;

    while let Some(rel) = memchr(b'<', &bytes[cursor..]) {
        let lt = cursor + rel;
        let Some(tag) = match_tag(text, lt) else {
            cursor = lt + 1;
            continue;
        };

        // The reserved citation tag is never a tool call; its span
        // stays inside the surrounding prose. Same for reasoning tags
        // once reasoning has been extracted upstream.
        if tag.name.eq_ignore_ascii_case(&config.citation_tag)
            || (!reasoning_inline && tag.name.eq_ignore_ascii_case(&config.reasoning_tag))
        {
            cursor = tag.end;
            continue;
        }

        flush_text_gap(text, last_end, lt, &mut segments);

        if reasoning_inline && tag.name.eq_ignore_ascii_case(&config.reasoning_tag) {
            segments.push(ContentSegment::Reasoning {
                reasoning: tag.inner.to_string(),
            });
        } else if tag.name.eq_ignore_ascii_case(&config.ask_tag) {
            segments.push(ContentSegment::Ask {
                content: tag.inner.trim().to_string(),
                attachments: parse_attachments(tag.attrs),
            });
        } else {
            segments.push(ContentSegment::ToolInvocation(build_invocation(
                text, &tag,
            )));
        }

        last_end = tag.end;
        cursor = tag.end;
    }

    flush_text_gap(text, last_end, text.len(), &mut segments);
    segments
}

struct MatchedTag<'a> {
    name: &'a str,
    attrs: &'a str,
    inner: &'a str,
    start: usize,
    end: usize,
}

/// Try to read one complete tag at `lt` (which points at `<`).
///
/// Returns `None` when the span is not a complete recognizable tag —
/// a bare `<`, an open tag with no `>`, or a paired tag whose close
/// never appears. The caller then treats the `<` as literal prose.
fn match_tag(text: &str, lt: usize) -> Option<MatchedTag<'_>> {
    let bytes = text.as_bytes();
    let name = tag_name_at(text, lt + 1)?;
    let gt = lt + memchr(b'>', &bytes[lt..])?;

    let self_closing = gt > lt && bytes[gt - 1] == b'/';
    let attrs_end = if self_closing { gt - 1 } else { gt };
    let attrs = text.get(lt + 1 + name.len()..attrs_end)?;
    // A '<' before the closing '>' means this was never a tag.
    if memchr(b'<', attrs.as_bytes()).is_some() {
        return None;
    }

    if self_closing {
        return Some(MatchedTag {
            name,
            attrs,
            inner: "",
            start: lt,
            end: gt + 1,
        });
    }

    let (close_start, close_end) = find_close_tag(text, name, gt + 1)?;
    Some(MatchedTag {
        name,
        attrs,
        inner: text.get(gt + 1..close_start)?,
        start: lt,
        end: close_end,
    })
}

fn build_invocation(text: &str, tag: &MatchedTag<'_>) -> ToolInvocation {
    let mut parameters: BTreeMap<String, String> = parse_attrs(tag.attrs).into_iter().collect();
    let inner = tag.inner.trim();
    if !inner.is_empty() {
        parameters
            .entry(INNER_CONTENT_KEY.to_string())
            .or_insert_with(|| inner.to_string());
    }
    ToolInvocation {
        name: tag.name.to_string(),
        raw_tag: text[tag.start..tag.end].to_string(),
        parameters,
    }
}

fn parse_attachments(attrs: &str) -> Vec<String> {
    extract_attr(attrs, ATTACHMENTS_ATTR)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Emit the verbatim gap between two matches when it carries anything
/// visible; whitespace-only gaps are dropped.
fn flush_text_gap(text: &str, from: usize, to: usize, segments: &mut Vec<ContentSegment>) {
    let Some(gap) = text.get(from..to) else {
        return;
    };
    if !gap.trim().is_empty() {
        segments.push(ContentSegment::Text {
            text: gap.to_string(),
        });
    }
}
