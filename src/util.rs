use std::borrow::Cow;

use memchr::{memchr, memmem};

// Shared low-level scanning helpers for the tag grammars. Both dialects
// and the inline-result string path lean on these, so they live here
// rather than in either segmenter module.

/// Tag names follow the identifier convention `[A-Za-z][A-Za-z0-9_-]*`.
#[inline]
pub(crate) const fn is_tag_name_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic()
}

#[inline]
pub(crate) const fn is_tag_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-')
}

/// Read an identifier-like tag name starting at `pos` (the byte after
/// `<` or `</`). Returns the name slice, or `None` when the byte at
/// `pos` cannot start a tag name.
#[inline]
pub(crate) fn tag_name_at(text: &str, pos: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    if !bytes.get(pos).copied().is_some_and(is_tag_name_start) {
        return None;
    }
    let mut end = pos + 1;
    while bytes.get(end).copied().is_some_and(is_tag_name_char) {
        end += 1;
    }
    text.get(pos..end)
}

/// Find the closing tag `</name>` (whitespace tolerated before `>`)
/// at or after `from`. Returns `(close_start, end_after_gt)`.
pub(crate) fn find_close_tag(text: &str, name: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut cursor = from;
    while let Some(rel_lt) = memchr(b'<', bytes.get(cursor..)?) {
        let start = cursor + rel_lt;
        if bytes.get(start + 1) != Some(&b'/') {
            cursor = start + 1;
            continue;
        }
        let name_start = start + 2;
        let name_end = name_start + name.len();
        if bytes
            .get(name_start..name_end)
            .is_some_and(|slice| slice.eq_ignore_ascii_case(name.as_bytes()))
        {
            let mut idx = name_end;
            while bytes.get(idx).is_some_and(u8::is_ascii_whitespace) {
                idx += 1;
            }
            if bytes.get(idx) == Some(&b'>') {
                return Some((start, idx + 1));
            }
        }
        cursor = start + 1;
    }
    None
}

/// Extract one `name="value"` (or single-quoted) attribute from the
/// attribute region of a start tag.
pub(crate) fn extract_attr<'a>(attrs: &'a str, attr: &str) -> Option<&'a str> {
    let bytes = attrs.as_bytes();
    let mut search_from = 0usize;
    while let Some(rel) = memmem::find(&bytes[search_from..], attr.as_bytes()) {
        let name_start = search_from + rel;
        let name_end = name_start + attr.len();
        let left_ok = name_start == 0 || !is_tag_name_char(bytes[name_start - 1]);
        let right_ok = !bytes.get(name_end).copied().is_some_and(is_tag_name_char);
        if !left_ok || !right_ok {
            search_from = name_start + 1;
            continue;
        }
        let mut idx = name_end;
        while bytes.get(idx).is_some_and(u8::is_ascii_whitespace) {
            idx += 1;
        }
        if bytes.get(idx) != Some(&b'=') {
            search_from = name_start + 1;
            continue;
        }
        idx += 1;
        while bytes.get(idx).is_some_and(u8::is_ascii_whitespace) {
            idx += 1;
        }
        let quote = *bytes.get(idx)?;
        if quote != b'"' && quote != b'\'' {
            search_from = name_start + 1;
            continue;
        }
        let value_start = idx + 1;
        let value_end = value_start + memchr(quote, &bytes[value_start..])?;
        return attrs.get(value_start..value_end);
    }
    None
}

/// Parse every `name="value"` pair in a start tag's attribute region,
/// in document order. Malformed stretches are skipped, not fatal.
pub(crate) fn parse_attrs(attrs: &str) -> Vec<(String, String)> {
    let bytes = attrs.as_bytes();
    let mut out = Vec::new();
    let mut idx = 0usize;
    while idx < bytes.len() {
        while bytes.get(idx).is_some_and(u8::is_ascii_whitespace) {
            idx += 1;
        }
        if !bytes.get(idx).copied().is_some_and(is_tag_name_start) {
            idx += 1;
            continue;
        }
        let name_start = idx;
        while bytes.get(idx).copied().is_some_and(is_tag_name_char) {
            idx += 1;
        }
        let name_end = idx;
        while bytes.get(idx).is_some_and(u8::is_ascii_whitespace) {
            idx += 1;
        }
        if bytes.get(idx) != Some(&b'=') {
            continue;
        }
        idx += 1;
        while bytes.get(idx).is_some_and(u8::is_ascii_whitespace) {
            idx += 1;
        }
        let Some(&quote) = bytes.get(idx) else { break };
        if quote != b'"' && quote != b'\'' {
            continue;
        }
        let value_start = idx + 1;
        let Some(rel_end) = memchr(quote, &bytes[value_start..]) else {
            break;
        };
        let value_end = value_start + rel_end;
        if let (Some(name), Some(value)) =
            (attrs.get(name_start..name_end), attrs.get(value_start..value_end))
        {
            out.push((
                name.to_string(),
                decode_xml_entities(value).into_owned(),
            ));
        }
        idx = value_end + 1;
    }
    out
}

/// Unwrap `<![CDATA[...]]>` sections, concatenating their inner content.
/// Text without CDATA is returned borrowed; malformed CDATA is kept
/// verbatim rather than truncated.
pub(crate) fn unwrap_cdata(text: &str) -> Cow<'_, str> {
    const CDATA_OPEN: &[u8] = b"<![CDATA[";
    const CDATA_CLOSE: &[u8] = b"]]>";

    let bytes = text.as_bytes();
    let mut out: Option<String> = None;
    let mut cursor = 0usize;

    while let Some(open_rel) = memmem::find(&bytes[cursor..], CDATA_OPEN) {
        let content_start = cursor + open_rel + CDATA_OPEN.len();
        let Some(close_rel) = memmem::find(&bytes[content_start..], CDATA_CLOSE) else {
            return Cow::Borrowed(text);
        };
        let content_end = content_start + close_rel;
        if let Some(part) = text.get(content_start..content_end) {
            out.get_or_insert_with(|| String::with_capacity(text.len()))
                .push_str(part);
        }
        cursor = content_end + CDATA_CLOSE.len();
    }

    out.map_or(Cow::Borrowed(text), Cow::Owned)
}

/// Decode the five predefined XML entities. Anything else after `&` is
/// left as-is.
pub(crate) fn decode_xml_entities(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    let Some(first_amp) = memchr(b'&', bytes) else {
        return Cow::Borrowed(text);
    };

    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..first_amp]);
    let mut i = first_amp;
    while i < bytes.len() {
        let rest = &bytes[i..];
        if rest.starts_with(b"&amp;") {
            out.push('&');
            i += 5;
        } else if rest.starts_with(b"&lt;") {
            out.push('<');
            i += 4;
        } else if rest.starts_with(b"&gt;") {
            out.push('>');
            i += 4;
        } else if rest.starts_with(b"&quot;") {
            out.push('"');
            i += 6;
        } else if rest.starts_with(b"&apos;") {
            out.push('\'');
            i += 6;
        } else {
            out.push('&');
            i += 1;
        }

        let Some(next_rel) = memchr(b'&', &bytes[i..]) else {
            out.push_str(&text[i..]);
            break;
        };
        let next_amp = i + next_rel;
        out.push_str(&text[i..next_amp]);
        i = next_amp;
    }
    Cow::Owned(out)
}
