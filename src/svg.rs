//! SVG source parsing and attribute-level rewriting.
//!
//! The source is parsed once with roxmltree to enumerate drawable elements in
//! document order. Rewrites (adding a class, hiding an element) touch only
//! the start tags being edited; every other byte of the source is copied
//! through unchanged, so the tagged output keeps the author's formatting.
use crate::error::{PipelineError, PipelineResult};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Element names treated as individually taggable drawables.
pub const DRAWABLE_TAGS: &[&str] = &[
    "path", "rect", "circle", "ellipse", "line", "polyline", "polygon", "text", "image", "use",
];

/// Containers whose children are never rendered directly.
const NON_RENDERED_CONTAINERS: &[&str] = &[
    "defs", "clipPath", "mask", "symbol", "pattern", "marker", "linearGradient",
    "radialGradient", "filter",
];

const SUMMARY_VALUE_LIMIT: usize = 60;

/// The root coordinate system of an SVG.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewBox {
    pub min_x: f64,
    pub min_y: f64,
    pub width: f64,
    pub height: f64,
}

impl fmt::Display for ViewBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.min_x, self.min_y, self.width, self.height
        )
    }
}

/// A drawable element found in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawableElement {
    /// Position in document order among drawables.
    pub index: usize,
    pub tag: String,
    pub id: Option<String>,
    /// Byte offset of the element's `<`.
    start: usize,
    summary: String,
}

impl DrawableElement {
    /// One-line description used in labeling prompts.
    pub fn summary(&self) -> &str {
        &self.summary
    }
}

/// A parsed SVG document with its drawable inventory.
#[derive(Debug, Clone)]
pub struct SvgSource {
    path: PathBuf,
    text: String,
    elements: Vec<DrawableElement>,
    viewbox: ViewBox,
}

impl SvgSource {
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| PipelineError::io(path, source))?;
        Self::parse(path.to_path_buf(), text)
    }

    pub fn parse(path: PathBuf, text: String) -> PipelineResult<Self> {
        let (elements, viewbox) = {
            let doc = parse_document(&text)?;
            let root = doc.root_element();
            if root.tag_name().name() != "svg" {
                return Err(PipelineError::svg(format!(
                    "{}: root element is <{}>, expected <svg>",
                    path.display(),
                    root.tag_name().name()
                )));
            }
            let viewbox = parse_viewbox(root)?;
            let elements = root
                .descendants()
                .filter(|node| node.is_element())
                .filter(|node| DRAWABLE_TAGS.contains(&node.tag_name().name()))
                .filter(|node| !inside_non_rendered(*node))
                .enumerate()
                .map(|(index, node)| DrawableElement {
                    index,
                    tag: node.tag_name().name().to_string(),
                    id: node.attribute("id").map(str::to_string),
                    start: node.range().start,
                    summary: summarize(index, node),
                })
                .collect::<Vec<_>>();
            (elements, viewbox)
        };
        if elements.is_empty() {
            return Err(PipelineError::svg(format!(
                "{}: no drawable elements to animate",
                path.display()
            )));
        }
        Ok(Self {
            path,
            text,
            elements,
            viewbox,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn elements(&self) -> &[DrawableElement] {
        &self.elements
    }

    pub fn viewbox(&self) -> ViewBox {
        self.viewbox
    }

    /// Multi-line inventory of drawables for prompts.
    pub fn inventory(&self) -> String {
        self.elements
            .iter()
            .map(DrawableElement::summary)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Apply attribute edits keyed by drawable index.
    pub fn rewrite(&self, edits: &BTreeMap<usize, Vec<AttrEdit>>) -> PipelineResult<String> {
        let mut out = String::with_capacity(self.text.len() + edits.len() * 24);
        let mut cursor = 0;
        for (index, element_edits) in edits {
            let element = self.elements.get(*index).ok_or_else(|| {
                PipelineError::svg(format!("drawable index {index} out of range"))
            })?;
            let end = start_tag_end(&self.text, element.start).ok_or_else(|| {
                PipelineError::svg(format!("unterminated start tag for drawable {index}"))
            })?;
            out.push_str(&self.text[cursor..element.start]);
            let mut tag = StartTag::parse(&self.text[element.start..end])?;
            for edit in element_edits {
                tag.apply(edit);
            }
            out.push_str(&tag.render());
            cursor = end;
        }
        out.push_str(&self.text[cursor..]);
        Ok(out)
    }
}

/// One attribute-level change to a start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrEdit {
    /// Add a token to the `class` attribute (created if absent).
    AddClass(String),
    /// Set an attribute, replacing any existing value.
    Set(String, String),
}

/// Return the root `<svg>...</svg>` markup without prolog or doctype.
pub fn root_markup(text: &str) -> PipelineResult<&str> {
    let doc = parse_document(text)?;
    let range = doc.root_element().range();
    Ok(&text[range])
}

fn parse_document(text: &str) -> PipelineResult<roxmltree::Document<'_>> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    roxmltree::Document::parse_with_options(text, options)
        .map_err(|err| PipelineError::svg(format!("parse svg: {err}")))
}

fn inside_non_rendered(node: roxmltree::Node<'_, '_>) -> bool {
    node.ancestors()
        .skip(1)
        .any(|ancestor| NON_RENDERED_CONTAINERS.contains(&ancestor.tag_name().name()))
}

fn summarize(index: usize, node: roxmltree::Node<'_, '_>) -> String {
    let mut summary = format!("#{index} <{}", node.tag_name().name());
    for attr in node.attributes() {
        let value = attr.value();
        let value = if value.len() > SUMMARY_VALUE_LIMIT {
            let mut end = SUMMARY_VALUE_LIMIT;
            while !value.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &value[..end])
        } else {
            value.to_string()
        };
        summary.push_str(&format!(" {}=\"{}\"", attr.name(), value));
    }
    summary.push('>');
    if node.tag_name().name() == "text" {
        let content: String = node
            .descendants()
            .filter(|child| child.is_text())
            .filter_map(|child| child.text())
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if !content.is_empty() {
            summary.push_str(&format!(" \"{content}\""));
        }
    }
    summary
}

fn parse_viewbox(root: roxmltree::Node<'_, '_>) -> PipelineResult<ViewBox> {
    if let Some(raw) = root.attribute("viewBox") {
        let numbers: Vec<f64> = raw
            .split(|ch: char| ch.is_whitespace() || ch == ',')
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|err| PipelineError::svg(format!("invalid viewBox {raw:?}: {err}")))?;
        if let [min_x, min_y, width, height] = numbers[..] {
            if width > 0.0 && height > 0.0 {
                return Ok(ViewBox {
                    min_x,
                    min_y,
                    width,
                    height,
                });
            }
        }
        return Err(PipelineError::svg(format!("invalid viewBox {raw:?}")));
    }
    let width = root.attribute("width").and_then(parse_length);
    let height = root.attribute("height").and_then(parse_length);
    match (width, height) {
        (Some(width), Some(height)) if width > 0.0 && height > 0.0 => Ok(ViewBox {
            min_x: 0.0,
            min_y: 0.0,
            width,
            height,
        }),
        _ => Err(PipelineError::svg(
            "svg has neither a viewBox nor a numeric width/height",
        )),
    }
}

fn parse_length(raw: &str) -> Option<f64> {
    raw.trim().trim_end_matches("px").trim().parse().ok()
}

/// Find the byte offset just past the `>` closing the start tag at `start`.
fn start_tag_end(text: &str, start: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        match (quote, byte) {
            (Some(q), b) if *b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"') | (None, b'\'') => quote = Some(*byte),
            (None, b'>') => return Some(start + offset + 1),
            (None, _) => {}
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RawAttr {
    name: String,
    quote: char,
    /// Value as written, entities left escaped.
    value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StartTag {
    name: String,
    attrs: Vec<RawAttr>,
    self_closing: bool,
}

impl StartTag {
    fn parse(raw: &str) -> PipelineResult<Self> {
        let malformed = || PipelineError::svg(format!("malformed start tag: {raw}"));
        let inner = raw
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
            .ok_or_else(malformed)?;
        let (inner, self_closing) = match inner.trim_end().strip_suffix('/') {
            Some(stripped) => (stripped, true),
            None => (inner, false),
        };
        let name_end = inner
            .find(|ch: char| ch.is_whitespace())
            .unwrap_or(inner.len());
        let name = inner[..name_end].to_string();
        if name.is_empty() {
            return Err(malformed());
        }

        let mut attrs = Vec::new();
        let mut rest = inner[name_end..].trim_start();
        while !rest.is_empty() {
            let eq = rest.find('=').ok_or_else(malformed)?;
            let attr_name = rest[..eq].trim().to_string();
            let after_eq = rest[eq + 1..].trim_start();
            let quote = after_eq.chars().next().ok_or_else(malformed)?;
            if quote != '"' && quote != '\'' {
                return Err(malformed());
            }
            let close = after_eq[1..].find(quote).ok_or_else(malformed)?;
            attrs.push(RawAttr {
                name: attr_name,
                quote,
                value: after_eq[1..1 + close].to_string(),
            });
            rest = after_eq[close + 2..].trim_start();
        }
        Ok(Self {
            name,
            attrs,
            self_closing,
        })
    }

    fn apply(&mut self, edit: &AttrEdit) {
        match edit {
            AttrEdit::AddClass(class) => match self.attrs.iter_mut().find(|a| a.name == "class") {
                Some(attr) => {
                    if !attr.value.split_whitespace().any(|token| token == class) {
                        if !attr.value.trim().is_empty() {
                            attr.value.push(' ');
                        }
                        attr.value.push_str(&escape_attr(class));
                    }
                }
                None => self.attrs.push(RawAttr {
                    name: "class".to_string(),
                    quote: '"',
                    value: escape_attr(class),
                }),
            },
            AttrEdit::Set(name, value) => {
                let escaped = escape_attr(value);
                match self.attrs.iter_mut().find(|a| &a.name == name) {
                    Some(attr) => {
                        attr.quote = '"';
                        attr.value = escaped;
                    }
                    None => self.attrs.push(RawAttr {
                        name: name.clone(),
                        quote: '"',
                        value: escaped,
                    }),
                }
            }
        }
    }

    fn render(&self) -> String {
        let mut out = format!("<{}", self.name);
        for attr in &self.attrs {
            out.push_str(&format!(" {}={q}{}{q}", attr.name, attr.value, q = attr.quote));
        }
        out.push_str(if self.self_closing { "/>" } else { ">" });
        out
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHAPES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 200 100">
  <defs><circle id="ghost" r="1"/></defs>
  <circle id="c" cx="50" cy="50" r="20" fill="red"/>
  <g transform="translate(10,0)">
    <rect class="shape" x="100" y="30" width="40" height="40" title='a > b'/>
  </g>
  <text x="5" y="95">Hello
    world</text>
</svg>
"#;

    fn shapes() -> SvgSource {
        SvgSource::parse(PathBuf::from("shapes.svg"), SHAPES.to_string()).expect("parse shapes")
    }

    #[test]
    fn enumerates_rendered_drawables_in_document_order() {
        let svg = shapes();
        let tags: Vec<&str> = svg.elements().iter().map(|e| e.tag.as_str()).collect();
        assert_eq!(tags, ["circle", "rect", "text"]);
        assert_eq!(svg.elements()[0].id.as_deref(), Some("c"));
        assert_eq!(
            svg.viewbox(),
            ViewBox {
                min_x: 0.0,
                min_y: 0.0,
                width: 200.0,
                height: 100.0
            }
        );
        assert!(svg.inventory().contains("#2 <text x=\"5\" y=\"95\"> \"Hello world\""));
    }

    #[test]
    fn rewrite_touches_only_edited_tags() {
        let svg = shapes();
        let mut edits = BTreeMap::new();
        edits.insert(0, vec![AttrEdit::AddClass("circle".to_string())]);
        edits.insert(
            1,
            vec![
                AttrEdit::AddClass("square".to_string()),
                AttrEdit::Set("display".to_string(), "none".to_string()),
            ],
        );
        let out = svg.rewrite(&edits).expect("rewrite");

        assert!(out.contains(
            r#"<circle id="c" cx="50" cy="50" r="20" fill="red" class="circle"/>"#
        ));
        assert!(out.contains(
            r#"<rect class="shape square" x="100" y="30" width="40" height="40" title='a > b' display="none"/>"#
        ));
        assert!(out.contains(r#"<defs><circle id="ghost" r="1"/></defs>"#));
        assert!(out.starts_with("<?xml"));

        let reparsed = SvgSource::parse(PathBuf::from("out.svg"), out).expect("reparse");
        assert_eq!(reparsed.elements().len(), 3);
    }

    #[test]
    fn add_class_is_idempotent() {
        let mut tag = StartTag::parse(r#"<path class="a b" d="M0 0"/>"#).expect("parse");
        tag.apply(&AttrEdit::AddClass("b".to_string()));
        tag.apply(&AttrEdit::AddClass("c".to_string()));
        assert_eq!(tag.render(), r#"<path class="a b c" d="M0 0"/>"#);
    }

    #[test]
    fn viewbox_falls_back_to_dimensions() {
        let svg = SvgSource::parse(
            PathBuf::from("s.svg"),
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="64px" height="32"><rect width="1" height="1"/></svg>"#
                .to_string(),
        )
        .expect("parse");
        assert_eq!(svg.viewbox().to_string(), "0 0 64 32");
    }

    #[test]
    fn rejects_non_svg_and_empty_documents() {
        assert!(matches!(
            SvgSource::parse(PathBuf::from("x"), "<html/>".to_string()),
            Err(PipelineError::Svg(_))
        ));
        assert!(matches!(
            SvgSource::parse(
                PathBuf::from("x"),
                r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 1 1"><g/></svg>"#.to_string()
            ),
            Err(PipelineError::Svg(_))
        ));
    }

    #[test]
    fn root_markup_strips_prolog() {
        let markup = root_markup(SHAPES).expect("root");
        assert!(markup.starts_with("<svg"));
        assert!(markup.ends_with("</svg>"));
    }
}
