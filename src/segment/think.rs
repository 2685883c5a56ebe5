/// Reasoning-span extraction, independent of the tool-call grammars.
///
/// Reasoning arrives embedded in free text as a paired pseudo-tag
/// (`<think>…</think>` by default). Extraction is regex-driven:
/// case-insensitive, dot-matches-newline, non-greedy — which means
/// each open tag pairs with the first subsequent close tag. Nested
/// identical tags are therefore not specially paired; an inner
/// duplicate open is literal text. That asymmetry is deliberate and
/// pinned by tests below.
use std::borrow::Cow;

use regex_lite::Regex;

use crate::config::ConfigError;
use crate::util::{is_tag_name_char, is_tag_name_start};

pub struct ThinkExtractor {
    pattern: Regex,
}

impl ThinkExtractor {
    /// Build an extractor for one reasoning tag name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when `tag` is not an
    /// identifier-like tag name.
    pub fn new(tag: &str) -> Result<Self, ConfigError> {
        let bytes = tag.as_bytes();
        let identifier_like = bytes.first().copied().is_some_and(is_tag_name_start)
            && bytes[1..].iter().copied().all(is_tag_name_char);
        if !identifier_like {
            return Err(ConfigError::Validation(format!(
                "reasoning tag must be identifier-like, got '{tag}'"
            )));
        }
        let pattern = Regex::new(&format!("(?is)<{tag}>(.*?)</{tag}>"))
            .map_err(|e| ConfigError::Validation(format!("reasoning tag pattern: {e}")))?;
        Ok(Self { pattern })
    }

    /// Concatenate the inner contents of every reasoning span, in order
    /// of appearance, joined by a newline. `None` when the text has no
    /// complete span.
    #[must_use]
    pub fn extract(&self, text: &str) -> Option<String> {
        let mut out: Option<String> = None;
        for captures in self.pattern.captures_iter(text) {
            let Some(inner) = captures.get(1) else {
                continue;
            };
            match out.as_mut() {
                Some(buf) => {
                    buf.push('\n');
                    buf.push_str(inner.as_str());
                }
                None => out = Some(inner.as_str().to_string()),
            }
        }
        out
    }

    /// Strip the exact spans [`extract`](Self::extract) reads, leaving
    /// the rest of the text untouched. An unterminated open tag does
    /// not match and survives verbatim.
    #[must_use]
    pub fn remove<'a>(&self, text: &'a str) -> Cow<'a, str> {
        self.pattern.replace_all(text, "")
    }
}
