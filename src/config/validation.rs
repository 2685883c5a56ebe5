use super::{ConfigError, SegmenterConfig};
use crate::util::{is_tag_name_char, is_tag_name_start};

/// Validate a loaded [`SegmenterConfig`].
///
/// Rules:
/// - every tag name must be identifier-like (`[A-Za-z][A-Za-z0-9_-]*`)
/// - the special tags must be pairwise distinct
/// - the primary-parameter priority list must be non-empty
/// - every streaming allow-list entry must be identifier-like
pub fn validate_config(config: &SegmenterConfig) -> Result<(), ConfigError> {
    for (field, value) in [
        ("reasoning_tag", &config.reasoning_tag),
        ("citation_tag", &config.citation_tag),
        ("ask_tag", &config.ask_tag),
        ("wrapper_tag", &config.wrapper_tag),
        ("invoke_tag", &config.invoke_tag),
        ("parameter_tag", &config.parameter_tag),
    ] {
        validate_tag_name(field, value)?;
    }

    let special = [
        &config.reasoning_tag,
        &config.citation_tag,
        &config.ask_tag,
        &config.wrapper_tag,
    ];
    for (i, a) in special.iter().enumerate() {
        for b in &special[i + 1..] {
            if a.eq_ignore_ascii_case(b) {
                return Err(ConfigError::Validation(format!(
                    "special tags must be distinct, found '{a}' twice"
                )));
            }
        }
    }

    if config.primary_param_priority.is_empty() {
        return Err(ConfigError::Validation(
            "primary_param_priority must not be empty".to_string(),
        ));
    }

    for tag in &config.streaming_tags {
        validate_tag_name("streaming_tags entry", tag)?;
    }

    Ok(())
}

fn validate_tag_name(field: &str, value: &str) -> Result<(), ConfigError> {
    let bytes = value.as_bytes();
    let valid = bytes
        .first()
        .copied()
        .is_some_and(is_tag_name_start)
        && bytes[1..].iter().copied().all(is_tag_name_char);
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{field} must be an identifier-like tag name, got '{value}'"
        )))
    }
}
