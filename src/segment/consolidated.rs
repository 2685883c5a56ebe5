/// Consolidated-dialect parser: invocations live inside a fixed
/// wrapper tag, each as an `<invoke name="…">` element with
/// `<parameter name="…">` children — a stricter grammar than the
/// legacy free-form tags.
///
/// Parsing is tiered the same way as elsewhere in this family of
/// decoders: a fast manual scan first, a strict XML pass as fallback,
/// and on total failure the wrapper span degrades to a plain prose
/// segment. Reasoning tags get no special treatment here; reasoning is
/// expected to be extracted before this dialect's segmentation runs.
use std::collections::BTreeMap;

use memchr::{memchr, memmem};

use crate::config::SegmenterConfig;
use crate::util::{decode_xml_entities, extract_attr, find_close_tag, unwrap_cdata};

use super::{ContentSegment, ToolInvocation};

/// Segment `text` under the consolidated grammar.
pub(crate) fn segment(text: &str, config: &SegmenterConfig) -> Vec<ContentSegment> {
    let wrapper_open = format!("<{}>", config.wrapper_tag);
    let wrapper_close = format!("</{}>", config.wrapper_tag);

    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut last_end = 0usize;
    let mut cursor = 0usize;

    while let Some(rel) = memmem::find(&bytes[cursor..], wrapper_open.as_bytes()) {
        let open_start = cursor + rel;
        let content_start = open_start + wrapper_open.len();
        let Some(close_rel) = memmem::find(&bytes[content_start..], wrapper_close.as_bytes())
        else {
            // Unterminated wrapper in finalized text: leave the rest as
            // prose via the trailing flush.
            break;
        };
        let content_end = content_start + close_rel;
        let span_end = content_end + wrapper_close.len();

        flush_text_gap(text, last_end, open_start, &mut segments);

        let inner = &text[content_start..content_end];
        match parse_invokes(inner, config) {
            Some(invokes) => {
                for invoke in invokes {
                    segments.push(ContentSegment::ToolInvocation(ToolInvocation {
                        name: invoke.name,
                        raw_tag: invoke
                            .span
                            .map_or_else(
                                || text[open_start..span_end].to_string(),
                                |(from, to)| inner[from..to].to_string(),
                            ),
                        parameters: invoke.parameters,
                    }));
                }
            }
            None => {
                tracing::warn!(
                    span_len = span_end - open_start,
                    "unparseable consolidated block rendered as prose"
                );
                segments.push(ContentSegment::Text {
                    text: text[open_start..span_end].to_string(),
                });
            }
        }

        last_end = span_end;
        cursor = span_end;
    }

    flush_text_gap(text, last_end, text.len(), &mut segments);
    segments
}

struct ParsedInvoke {
    name: String,
    parameters: BTreeMap<String, String>,
    /// Source span within the wrapper's inner text, when the parse tier
    /// can attribute one.
    span: Option<(usize, usize)>,
}

/// Parse the invocation sub-tags of one wrapper span. `None` means
/// neither tier could make sense of the block.
fn parse_invokes(inner: &str, config: &SegmenterConfig) -> Option<Vec<ParsedInvoke>> {
    parse_invokes_fast(inner, config).or_else(|| parse_invokes_strict(inner, config))
}

/// Tier 1 — manual scan. Keeps exact source spans for `raw_tag`.
fn parse_invokes_fast(inner: &str, config: &SegmenterConfig) -> Option<Vec<ParsedInvoke>> {
    let invoke_open = format!("<{}", config.invoke_tag);
    let parameter_open = format!("<{}", config.parameter_tag);

    let bytes = inner.as_bytes();
    let mut invokes = Vec::new();
    let mut cursor = 0usize;

    while let Some(rel) = memmem::find(&bytes[cursor..], invoke_open.as_bytes()) {
        let start = cursor + rel;
        let name_end = start + invoke_open.len();
        // Reject prefix matches like `<invoker`.
        if bytes
            .get(name_end)
            .is_some_and(|&b| !matches!(b, b'>' | b'/' | b' ' | b'\t' | b'\r' | b'\n'))
        {
            cursor = start + 1;
            continue;
        }

        let gt = start + memchr(b'>', &bytes[start..])?;
        let self_closing = bytes[gt - 1] == b'/';
        let attrs_end = if self_closing { gt - 1 } else { gt };
        let attrs = inner.get(name_end..attrs_end)?;
        let name = extract_attr(attrs, "name")?.to_string();

        if self_closing {
            invokes.push(ParsedInvoke {
                name,
                parameters: BTreeMap::new(),
                span: Some((start, gt + 1)),
            });
            cursor = gt + 1;
            continue;
        }

        let (close_start, close_end) = find_close_tag(inner, &config.invoke_tag, gt + 1)?;
        let body = inner.get(gt + 1..close_start)?;
        let parameters = parse_parameters_fast(body, &parameter_open, config)?;
        invokes.push(ParsedInvoke {
            name,
            parameters,
            span: Some((start, close_end)),
        });
        cursor = close_end;
    }

    Some(invokes)
}

fn parse_parameters_fast(
    body: &str,
    parameter_open: &str,
    config: &SegmenterConfig,
) -> Option<BTreeMap<String, String>> {
    let bytes = body.as_bytes();
    let mut parameters = BTreeMap::new();
    let mut cursor = 0usize;

    while let Some(rel) = memmem::find(&bytes[cursor..], parameter_open.as_bytes()) {
        let start = cursor + rel;
        let name_end = start + parameter_open.len();
        if bytes
            .get(name_end)
            .is_some_and(|&b| !matches!(b, b'>' | b'/' | b' ' | b'\t' | b'\r' | b'\n'))
        {
            cursor = start + 1;
            continue;
        }

        let gt = start + memchr(b'>', &bytes[start..])?;
        if bytes[gt - 1] == b'/' {
            // Self-closing parameter carries no value; skip it.
            cursor = gt + 1;
            continue;
        }
        let attrs = body.get(name_end..gt)?;
        let name = extract_attr(attrs, "name")?.to_string();

        let (close_start, close_end) = find_close_tag(body, &config.parameter_tag, gt + 1)?;
        let raw_value = unwrap_cdata(body.get(gt + 1..close_start)?);
        let value = decode_xml_entities(raw_value.trim());
        parameters.insert(name, value.into_owned());
        cursor = close_end;
    }

    Some(parameters)
}

/// Tier 2 — strict XML pass over the wrapper content, for blocks the
/// manual scan rejected (attribute edge cases, odd nesting). Spans are
/// not recoverable here, so `raw_tag` falls back to the wrapper span.
fn parse_invokes_strict(inner: &str, config: &SegmenterConfig) -> Option<Vec<ParsedInvoke>> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    enum State {
        Outside,
        InInvoke,
        InParameter { name: String, value: String },
    }

    let wrapped = format!("<{tag}>{inner}</{tag}>", tag = config.wrapper_tag);
    let mut reader = Reader::from_str(&wrapped);
    let mut invokes: Vec<ParsedInvoke> = Vec::new();
    let mut state = State::Outside;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let tag = e.name();
                let tag = tag.as_ref();
                if tag == config.invoke_tag.as_bytes() {
                    let name = xml_attr(e, "name")?;
                    invokes.push(ParsedInvoke {
                        name,
                        parameters: BTreeMap::new(),
                        span: None,
                    });
                    state = State::InInvoke;
                } else if tag == config.parameter_tag.as_bytes()
                    && matches!(state, State::InInvoke)
                {
                    let name = xml_attr(e, "name")?;
                    state = State::InParameter {
                        name,
                        value: String::new(),
                    };
                }
            }
            Ok(Event::Empty(ref e)) => {
                if e.name().as_ref() == config.invoke_tag.as_bytes() {
                    let name = xml_attr(e, "name")?;
                    invokes.push(ParsedInvoke {
                        name,
                        parameters: BTreeMap::new(),
                        span: None,
                    });
                }
            }
            Ok(Event::End(ref e)) => {
                let tag = e.name();
                let tag = tag.as_ref();
                if tag == config.parameter_tag.as_bytes() {
                    if let State::InParameter { name, value } =
                        std::mem::replace(&mut state, State::InInvoke)
                    {
                        if let Some(invoke) = invokes.last_mut() {
                            invoke.parameters.insert(name, value.trim().to_string());
                        }
                    }
                } else if tag == config.invoke_tag.as_bytes() {
                    state = State::Outside;
                }
            }
            Ok(Event::Text(ref e)) => {
                if let State::InParameter { value, .. } = &mut state {
                    match e.unescape() {
                        Ok(cow) => value.push_str(&cow),
                        Err(_) => value.push_str(&String::from_utf8_lossy(e.as_ref())),
                    }
                }
            }
            Ok(Event::CData(ref e)) => {
                if let State::InParameter { value, .. } = &mut state {
                    value.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
    }

    Some(invokes)
}

fn xml_attr(e: &quick_xml::events::BytesStart<'_>, name: &str) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name.as_bytes() {
            return Some(String::from_utf8_lossy(&attr.value).to_string());
        }
    }
    None
}

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
