pub mod validation;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Recognized-tag configuration for the segmenter.
///
/// The tag vocabulary was a set of module-level constants in the
/// original client; here it is explicit state handed to the segmenter
/// at construction time so tests can vary it freely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Paired tag carrying model reasoning, e.g. `<think>…</think>`.
    #[serde(default = "default_reasoning_tag")]
    pub reasoning_tag: String,
    /// Reserved inline-citation tag. Never treated as a tool call.
    #[serde(default = "default_citation_tag")]
    pub citation_tag: String,
    /// The user-facing question tag, rendered as prose with attachments.
    #[serde(default = "default_ask_tag")]
    pub ask_tag: String,
    /// Outer wrapper tag of the consolidated dialect.
    #[serde(default = "default_wrapper_tag")]
    pub wrapper_tag: String,
    /// Invocation sub-tag inside the wrapper.
    #[serde(default = "default_invoke_tag")]
    pub invoke_tag: String,
    /// Parameter sub-tag inside an invocation.
    #[serde(default = "default_parameter_tag")]
    pub parameter_tag: String,
    /// Parameter names tried in order when picking the one value shown
    /// in compact tool-call display.
    #[serde(default = "default_primary_param_priority")]
    pub primary_param_priority: Vec<String>,
    /// Invocation tag names allowed to trigger the transient
    /// "tool is running" placeholder while a message is still
    /// streaming. Distinct from the full parsing grammar: during
    /// streaming the tag name may be the only fully-formed signal.
    #[serde(default = "default_streaming_tags")]
    pub streaming_tags: FxHashSet<String>,
}

fn default_reasoning_tag() -> String {
    "think".to_string()
}
fn default_citation_tag() -> String {
    "cite".to_string()
}
fn default_ask_tag() -> String {
    "ask".to_string()
}
fn default_wrapper_tag() -> String {
    "function_calls".to_string()
}
fn default_invoke_tag() -> String {
    "invoke".to_string()
}
fn default_parameter_tag() -> String {
    "parameter".to_string()
}

fn default_primary_param_priority() -> Vec<String> {
    ["file_path", "command", "query", "url"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_streaming_tags() -> FxHashSet<String> {
    [
        "execute-command",
        "create-file",
        "full-file-rewrite",
        "str-replace",
        "delete-file",
        "web-search",
        "crawl-webpage",
        "browser-navigate",
        "ask",
        "complete",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            reasoning_tag: default_reasoning_tag(),
            citation_tag: default_citation_tag(),
            ask_tag: default_ask_tag(),
            wrapper_tag: default_wrapper_tag(),
            invoke_tag: default_invoke_tag(),
            parameter_tag: default_parameter_tag(),
            primary_param_priority: default_primary_param_priority(),
            streaming_tags: default_streaming_tags(),
        }
    }
}

/// Load a [`SegmenterConfig`] from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O failure, YAML syntax errors, or
/// validation failures.
pub fn load_config(path: &str) -> Result<SegmenterConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    parse_config(&raw)
}

/// Parse and validate a [`SegmenterConfig`] from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError`] on YAML syntax errors or validation failures.
pub fn parse_config(raw: &str) -> Result<SegmenterConfig, ConfigError> {
    let config: SegmenterConfig = serde_yaml::from_str(raw)?;
    validate_config(&config)?;
    Ok(config)
}
