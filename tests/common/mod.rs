//! Shared test infrastructure for integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::env;
use std::fs;
use std::path::PathBuf;
use svg_animator::dataset::DatasetRecord;
use svg_animator::model::{ModelClient, ModelRequest};
use svg_animator::pipeline::RunOptions;
use svg_animator::render::Rasterizer;
use svg_animator::PipelineResult;
use tempfile::TempDir;

pub const CIRCLE_CSS: &str =
    ".circle { animation: circle-pulse 2s infinite; }\n@keyframes circle-pulse { 50% { opacity: 0.4; } }";
pub const SQUARE_CSS: &str =
    ".square { animation: square-slide 3s infinite; }\n@keyframes square-slide { to { transform: translateX(30px); } }";

pub fn manifest_dir() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
}

pub fn fixture_dir(name: &str) -> PathBuf {
    manifest_dir().join("tests/fixtures").join(name)
}

/// Model double that answers through a handler and records every request.
pub struct ScriptedModel {
    handler: Box<dyn Fn(&ModelRequest) -> PipelineResult<String>>,
    requests: RefCell<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(handler: impl Fn(&ModelRequest) -> PipelineResult<String> + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Answers the shapes scenario: two classes, one element each.
    pub fn shapes() -> Self {
        Self::new(|request| Ok(shapes_response(&request.purpose)))
    }

    pub fn purposes(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|request| request.purpose.clone())
            .collect()
    }

    pub fn request(&self, purpose: &str) -> Option<ModelRequest> {
        self.requests
            .borrow()
            .iter()
            .find(|request| request.purpose == purpose)
            .cloned()
    }
}

impl ModelClient for ScriptedModel {
    fn complete(&self, request: &ModelRequest) -> PipelineResult<String> {
        self.requests.borrow_mut().push(request.clone());
        (self.handler)(request)
    }
}

pub fn shapes_response(purpose: &str) -> String {
    match purpose {
        "plan" => r#"{"circle": ["pulse"], "square": ["slide right"]}"#.to_string(),
        "animate:circle" => serde_json::json!({ "css": CIRCLE_CSS }).to_string(),
        "animate:square" => serde_json::json!({ "css": SQUARE_CSS }).to_string(),
        _ => r#"{"assignments": {"circle": [0], "square": [1]}}"#.to_string(),
    }
}

/// Rasterizer double: the "PNG" is the SVG markup itself.
pub struct StubRasterizer;

impl Rasterizer for StubRasterizer {
    fn rasterize_png(&self, svg: &str) -> PipelineResult<Vec<u8>> {
        Ok(svg.as_bytes().to_vec())
    }
}

/// A scratch run over the `shapes` fixture.
pub struct ShapesRun {
    pub temp_dir: TempDir,
    pub record: DatasetRecord,
    pub options: RunOptions,
}

impl ShapesRun {
    pub fn new(burn_in: usize) -> Self {
        let temp_dir = TempDir::new().expect("tempdir");
        let image = temp_dir.path().join("shapes.svg");
        fs::copy(fixture_dir("shapes").join("shapes.svg"), &image).expect("copy fixture");
        let logs = temp_dir.path().join("logs");
        let options = RunOptions {
            run_key: "shapes".to_string(),
            plan_cache_path: logs.join("plans.jsonl"),
            tagged_cache_path: logs.join("tagged.jsonl"),
            burn_in,
            output_path: logs.join("shapes").join("animation.html"),
        };
        Self {
            temp_dir,
            record: DatasetRecord {
                image,
                instruction: "Make the circle pulse and slide the square to the right.".to_string(),
            },
            options,
        }
    }
}

/// The `<style data-animation-class=...>` block for `class`, if present.
pub fn style_block<'h>(html: &'h str, class: &str) -> Option<&'h str> {
    let open = format!("<style data-animation-class=\"{class}\">");
    let start = html.find(&open)?;
    let end = start + html[start..].find("</style>")? + "</style>".len();
    Some(&html[start..end])
}
