//! Model-client collaborator.
//!
//! The pipeline only sees [`ModelClient`]: a structured request goes in and
//! the raw response text comes out. Provider specifics (HTTP endpoints,
//! authentication, streaming, a local command) live in the submodules, and
//! none of them retries: a failed call surfaces as `PipelineError::Model`.
//!
//! # Response parsing
//!
//! Models often wrap JSON in markdown fences or surround it with prose.
//! [`parse_json_response`] strips fences first and then falls back to the
//! first decodable JSON object in the text.
mod command;
mod http;
mod log;

pub use command::CommandModelClient;
pub use http::HttpModelClient;
pub use log::{append_model_log, load_model_log, LoggedClient, ModelLogEntry, ModelOutcome};

use crate::config::{ModelSettings, Provider};
use crate::error::{PipelineError, PipelineResult};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Which reasoning role a client plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    /// Vision + text: planning, tagging, generation.
    Vlm,
    /// Text only.
    Llm,
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vlm => write!(f, "vlm"),
            Self::Llm => write!(f, "llm"),
        }
    }
}

/// One piece of request content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// Base64-encoded PNG.
    PngBase64(String),
}

/// A structured model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    /// Short label used in logs (`plan`, `tag`, `animate:circle`).
    pub purpose: String,
    pub system: Option<String>,
    pub parts: Vec<ContentPart>,
}

impl ModelRequest {
    pub fn new(purpose: impl Into<String>) -> Self {
        Self {
            purpose: purpose.into(),
            system: None,
            parts: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(ContentPart::Text(text.into()));
        self
    }

    pub fn image(mut self, png_base64: impl Into<String>) -> Self {
        self.parts.push(ContentPart::PngBase64(png_base64.into()));
        self
    }

    /// Concatenate the text parts, in order.
    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::PngBase64(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, ContentPart::PngBase64(_)))
            .count()
    }
}

/// A provider able to answer a [`ModelRequest`].
pub trait ModelClient {
    fn complete(&self, request: &ModelRequest) -> PipelineResult<String>;
}

impl<C: ModelClient + ?Sized> ModelClient for Box<C> {
    fn complete(&self, request: &ModelRequest) -> PipelineResult<String> {
        (**self).complete(request)
    }
}

impl<C: ModelClient + ?Sized> ModelClient for &C {
    fn complete(&self, request: &ModelRequest) -> PipelineResult<String> {
        (**self).complete(request)
    }
}

/// Build the provider client described by `settings`.
pub fn build_client(settings: &ModelSettings) -> PipelineResult<Box<dyn ModelClient>> {
    match settings.provider {
        Provider::OpenAi | Provider::Azure => Ok(Box::new(HttpModelClient::new(settings)?)),
        Provider::Command => {
            let command = settings.command.as_deref().ok_or_else(|| {
                PipelineError::config("provider `command` requires --lm-command")
            })?;
            Ok(Box::new(CommandModelClient::new(command)?))
        }
    }
}

/// Parse a model response into JSON, tolerating fences and prose.
pub fn parse_json_response(text: &str) -> PipelineResult<Value> {
    let json_text = extract_json(text);
    match serde_json::from_str::<Value>(json_text) {
        Ok(value) => Ok(value),
        Err(err) => extract_json_from_text(json_text).ok_or_else(|| {
            PipelineError::model(format!(
                "response is not JSON: {err} at line {}, column {}; first 200 chars: {}",
                err.line(),
                err.column(),
                preview(text, 200)
            ))
        }),
    }
}

/// Extract JSON from text that might have markdown code fences.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let start = start + 3;
        // Skip language identifier if present
        let start = text[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    text
}

fn extract_json_from_text(raw: &str) -> Option<Value> {
    for (idx, ch) in raw.char_indices() {
        if ch != '{' {
            continue;
        }
        let mut deserializer = serde_json::Deserializer::from_str(&raw[idx..]);
        if let Ok(value) = Value::deserialize(&mut deserializer) {
            return Some(value);
        }
    }
    None
}

/// Truncate to at most `max_bytes` on a char boundary.
pub(crate) fn preview(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        let text = r#"{"circle": ["pulse"]}"#;
        assert_eq!(extract_json(text), r#"{"circle": ["pulse"]}"#);
    }

    #[test]
    fn test_extract_json_with_fences() {
        let text = "Here is the plan:\n```json\n{\"circle\": [\"pulse\"]}\n```\n";
        assert_eq!(extract_json(text), r#"{"circle": ["pulse"]}"#);
    }

    #[test]
    fn test_extract_json_plain_fences() {
        let text = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json(text), r#"{"a": 1}"#);
    }

    #[test]
    fn parse_json_response_falls_back_to_embedded_object() {
        let value = parse_json_response("Sure! {\"a\": [1, 2]} hope that helps")
            .expect("embedded object");
        assert_eq!(value["a"][1], 2);
    }

    #[test]
    fn parse_json_response_rejects_prose() {
        let err = parse_json_response("I cannot do that").expect_err("no json");
        assert!(matches!(err, PipelineError::Model(_)));
    }

    #[test]
    fn request_builder_orders_parts() {
        let request = ModelRequest::new("plan")
            .text("first")
            .image("AAAA")
            .text("second");
        assert_eq!(request.prompt_text(), "first\n\nsecond");
        assert_eq!(request.image_count(), 1);
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("héllo", 2), "h...");
        assert_eq!(preview("abc", 10), "abc");
    }
}
