//! Per-class CSS generation.
//!
//! The generator never touches the animation state: it receives a snapshot
//! of the current document and returns a [`Fragment`] for the pipeline to
//! merge.
use crate::css::{check_fragment, ReservedNames};
use crate::error::{PipelineError, PipelineResult};
use crate::model::{parse_json_response, ModelClient, ModelRequest};
use crate::svg::ViewBox;
use crate::util::fill_template;
use serde_json::Value;

const ANIMATE_PROMPT: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/animate.md"));
const ANIMATE_SYSTEM: &str =
    "You write CSS animations for SVG elements. Return a single JSON object only.";

/// Everything the model sees about one class.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentContext {
    pub class_name: String,
    pub viewbox: ViewBox,
    pub animation_plan: Vec<String>,
    /// Whole-image PNG, base64.
    pub big_picture: String,
    /// PNG of only this class's elements, base64.
    pub little_picture: String,
}

/// Generated CSS for one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub class_name: String,
    pub css: String,
}

pub struct AnimationGenerator<'a> {
    model: &'a dyn ModelClient,
}

impl<'a> AnimationGenerator<'a> {
    pub fn new(model: &'a dyn ModelClient) -> Self {
        Self { model }
    }

    pub fn animate(
        &self,
        context: &ContentContext,
        current_html: &str,
    ) -> PipelineResult<Fragment> {
        let class = context.class_name.as_str();
        let steps = context
            .animation_plan
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {step}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = fill_template(
            ANIMATE_PROMPT,
            &[
                ("class_name", class),
                ("viewbox", &context.viewbox.to_string()),
                ("steps", &steps),
                ("current_html", current_html),
            ],
        );
        let request = ModelRequest::new(format!("animate:{class}"))
            .with_system(ANIMATE_SYSTEM)
            .text(prompt)
            .image(context.big_picture.clone())
            .image(context.little_picture.clone());

        let response = self.model.complete(&request)?;
        let css = extract_css(class, &response)?;
        let reserved = ReservedNames::from_document(current_html, class).map_err(|err| {
            PipelineError::generation(class, format!("scan current document: {err}"))
        })?;
        validate_css(class, &css, &reserved)?;
        tracing::debug!(class, bytes = css.len(), "generated css");
        Ok(Fragment {
            class_name: class.to_string(),
            css,
        })
    }
}

/// Pull the CSS out of a ```css fence, a `{"css": ...}` object (possibly
/// wrapped in prose), or raw text.
fn extract_css(class: &str, response: &str) -> PipelineResult<String> {
    let trimmed = response.trim();
    if let Some(fenced) = css_fence(trimmed) {
        return Ok(fenced.trim().to_string());
    }
    let looks_like_json =
        trimmed.starts_with('{') || trimmed.contains("```json") || trimmed.contains("\"css\"");
    if looks_like_json {
        if let Ok(value) = parse_json_response(trimmed) {
            return match value.get("css") {
                Some(Value::String(css)) => Ok(css.trim().to_string()),
                _ => Err(PipelineError::generation(
                    class,
                    "response JSON has no string `css` field",
                )),
            };
        }
    }
    Ok(trimmed.to_string())
}

fn css_fence(text: &str) -> Option<&str> {
    let start = text.find("```css")? + "```css".len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(&rest[..end])
}

/// Reject fragments that are malformed or would touch other classes.
pub fn validate_css(class: &str, css: &str, reserved: &ReservedNames) -> PipelineResult<()> {
    check_fragment(class, css, reserved).map_err(|reason| PipelineError::generation(class, reason))
}
