//! The cumulative animated document.
//!
//! One `AnimationState` exists per run. It holds the tagged SVG markup and
//! an ordered list of class-scoped style blocks; the pipeline loop is its
//! only writer.
use crate::error::{PipelineError, PipelineResult};
use crate::generator::Fragment;
use crate::svg::{root_markup, SvgSource, ViewBox};
use crate::tagger::TaggedSvg;
use std::fs;
use std::path::{Path, PathBuf};

/// Attribute naming the class a `<style>` block belongs to.
pub const CLASS_BLOCK_ATTR: &str = "data-animation-class";

const BASE_STYLE: &str = "html, body { margin: 0; padding: 0; background: #fff; }
body { display: flex; align-items: center; justify-content: center; min-height: 100vh; }
svg { display: block; max-width: 100vw; max-height: 100vh; width: 100%; height: auto; }";

#[derive(Debug, Clone)]
pub struct AnimationState {
    svg_markup: String,
    viewbox: ViewBox,
    blocks: Vec<Fragment>,
}

impl AnimationState {
    /// Start from the tagged SVG with no animation blocks.
    pub fn new(tagged: &TaggedSvg) -> PipelineResult<Self> {
        let source = SvgSource::parse(PathBuf::from("tagged.svg"), tagged.svg.clone())?;
        let svg_markup = root_markup(source.text())?.to_string();
        Ok(Self {
            svg_markup,
            viewbox: source.viewbox(),
            blocks: Vec::new(),
        })
    }

    pub fn viewbox(&self) -> ViewBox {
        self.viewbox
    }

    /// The full HTML document as it stands.
    pub fn current_html(&self) -> String {
        let mut html = String::from(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n",
        );
        html.push_str(
            "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n",
        );
        html.push_str("<title>Animated SVG</title>\n");
        html.push_str(&format!("<style>\n{BASE_STYLE}\n</style>\n"));
        for block in &self.blocks {
            html.push_str(&format!(
                "<style {CLASS_BLOCK_ATTR}=\"{}\">\n{}\n</style>\n",
                block.class_name, block.css
            ));
        }
        html.push_str("</head>\n<body>\n");
        html.push_str(&self.svg_markup);
        html.push_str("\n</body>\n</html>\n");
        html
    }

    /// Add a class's block, or replace it in place if already merged.
    pub fn merge(&mut self, fragment: Fragment) {
        match self
            .blocks
            .iter_mut()
            .find(|block| block.class_name == fragment.class_name)
        {
            Some(existing) => {
                tracing::debug!(class = %fragment.class_name, "replacing animation block");
                existing.css = fragment.css;
            }
            None => {
                tracing::debug!(class = %fragment.class_name, "appending animation block");
                self.blocks.push(fragment);
            }
        }
    }

    /// The merged CSS for one class.
    pub fn rules_for(&self, class_name: &str) -> Option<&str> {
        self.blocks
            .iter()
            .find(|block| block.class_name == class_name)
            .map(|block| block.css.as_str())
    }

    /// Merged classes in document order.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(|block| block.class_name.as_str())
    }

    /// Write the final document; the state is consumed.
    pub fn save_to_html(self, path: &Path) -> PipelineResult<PathBuf> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| PipelineError::io(parent, source))?;
        }
        let html = self.current_html();
        fs::write(path, &html).map_err(|source| PipelineError::io(path, source))?;
        tracing::info!(
            path = %path.display(),
            classes = self.blocks.len(),
            bytes = html.len(),
            "saved animation"
        );
        Ok(path.to_path_buf())
    }
}
