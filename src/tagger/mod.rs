//! Multi-element SVG parser/tagger.
//!
//! Decomposes the source SVG into class-tagged elements consistent with the
//! plan. A single labeling call is noisy, so the tagger can run several
//! burn-in passes first; their consensus is fed to the final pass as hints,
//! and every pass (burn-in + final) is consolidated through a pluggable
//! [`Reconciler`]. Tagged results are cached per (SVG, class vocabulary).
//!
//! Lifecycle:
//!
//! ```text
//! set_parser -> load_tagged_svg -> (Pending) burn_in -> tag_semantics
//!                               -> (Materialized) done
//! ```
//!
//! After tagging, `full_svg_base64` and `render_by_class` provide the visual
//! context for generation.
mod reconcile;

pub use reconcile::{agreement, LatestPass, MajorityVote, Reconciler};

use crate::cache::{CacheEntry, Cached, JsonlCache};
use crate::error::{PipelineError, PipelineResult};
use crate::model::{parse_json_response, ModelClient, ModelRequest};
use crate::plan::Plan;
use crate::render::{rasterize_base64, Rasterizer};
use crate::svg::{AttrEdit, SvgSource};
use crate::util::{fill_template, sha256_hex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::path::PathBuf;

const TAG_PROMPT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/tag.md"));
const TAG_SYSTEM: &str = "You label SVG elements. Return a single JSON object only.";

/// Element index -> class name, for one labeling pass.
pub type Labeling = BTreeMap<usize, String>;

/// The source SVG with drawables tagged by class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedSvg {
    /// Tagged markup: every tagged drawable carries its class.
    pub svg: String,
    /// Class name -> drawable indices, in document order.
    pub classes: BTreeMap<String, Vec<usize>>,
}

impl TaggedSvg {
    fn from_labeling(source: &SvgSource, labeling: &Labeling) -> PipelineResult<Self> {
        let mut classes: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut edits = BTreeMap::new();
        for (element, class) in labeling {
            classes.entry(class.clone()).or_default().push(*element);
            edits.insert(*element, vec![AttrEdit::AddClass(class.clone())]);
        }
        Ok(Self {
            svg: source.rewrite(&edits)?,
            classes,
        })
    }

    /// Planned classes that resolve to no element.
    pub fn missing_classes(&self, plan: &Plan) -> Vec<String> {
        plan.class_names()
            .filter(|name| {
                !self
                    .classes
                    .get(*name)
                    .is_some_and(|elements| !elements.is_empty())
            })
            .map(str::to_string)
            .collect()
    }
}

/// One persisted tagging result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedCacheEntry {
    /// SHA-256 over the SVG text and the sorted class vocabulary.
    pub key: String,
    pub svg_path: PathBuf,
    pub tagged: TaggedSvg,
}

impl CacheEntry for TaggedCacheEntry {
    fn key(&self) -> &str {
        &self.key
    }
}

struct Binding {
    source: SvgSource,
    plan: Plan,
    vocabulary: Vec<String>,
    cache_key: String,
}

pub struct MultiSvgParser<'a> {
    model: &'a dyn ModelClient,
    rasterizer: &'a dyn Rasterizer,
    cache: JsonlCache<TaggedCacheEntry>,
    reconciler: Box<dyn Reconciler>,
    binding: Option<Binding>,
    burn_in_passes: Vec<Labeling>,
    tagged: Option<TaggedSvg>,
    full_png: OnceCell<String>,
}

impl<'a> MultiSvgParser<'a> {
    pub fn new(
        model: &'a dyn ModelClient,
        rasterizer: &'a dyn Rasterizer,
        cache_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            model,
            rasterizer,
            cache: JsonlCache::new(cache_path),
            reconciler: Box::new(MajorityVote),
            binding: None,
            burn_in_passes: Vec::new(),
            tagged: None,
            full_png: OnceCell::new(),
        }
    }

    pub fn with_reconciler(mut self, reconciler: Box<dyn Reconciler>) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// Bind the source SVG and the plan's class vocabulary.
    ///
    /// Rebinding discards burn-in passes, tagging, and the cached rendering.
    pub fn set_parser(&mut self, source: SvgSource, plan: &Plan) {
        let mut vocabulary: Vec<String> = plan.class_names().map(str::to_string).collect();
        vocabulary.sort();
        let vocab_bytes = vocabulary.join("\n");
        let cache_key = sha256_hex(&[source.text().as_bytes(), vocab_bytes.as_bytes()]);
        tracing::debug!(
            svg = %source.path().display(),
            drawables = source.elements().len(),
            classes = vocabulary.len(),
            "parser bound"
        );
        self.binding = Some(Binding {
            source,
            plan: plan.clone(),
            vocabulary,
            cache_key,
        });
        self.burn_in_passes.clear();
        self.tagged = None;
        self.full_png = OnceCell::new();
    }

    fn binding(&self) -> PipelineResult<&Binding> {
        self.binding
            .as_ref()
            .ok_or_else(|| PipelineError::config("svg parser used before set_parser"))
    }

    /// Try the tagged-decomposition cache; never fails.
    pub fn load_tagged_svg(&mut self) -> Cached<TaggedSvg> {
        let Some(binding) = self.binding.as_ref() else {
            return Cached::Pending;
        };
        let cached = self.cache.load_where(&binding.cache_key, |entry| {
            let missing = entry.tagged.missing_classes(&binding.plan);
            if !missing.is_empty() {
                tracing::warn!(?missing, "cached tagging is incomplete; skipping entry");
            }
            missing.is_empty()
        });
        match cached {
            Cached::Materialized(entry) => {
                tracing::info!(
                    path = %self.cache.path().display(),
                    classes = entry.tagged.classes.len(),
                    "loaded tagged svg from cache"
                );
                self.tagged = Some(entry.tagged.clone());
                Cached::Materialized(entry.tagged)
            }
            Cached::Pending => Cached::Pending,
        }
    }

    /// Run `count` calibration passes before the final tagging.
    pub fn burn_in(&mut self, count: usize) -> PipelineResult<()> {
        for pass in 1..=count {
            let labeling = self.label_pass(&format!("burn_in:{pass}"), None)?;
            let consensus = self.reconciler.reconcile(&self.burn_in_passes);
            tracing::info!(
                pass,
                of = count,
                labeled = labeling.len(),
                agreement = agreement(&labeling, &consensus),
                "burn-in pass complete"
            );
            self.burn_in_passes.push(labeling);
        }
        Ok(())
    }

    /// Final labeling pass, reconciled with burn-in, checked for gaps, cached.
    pub fn tag_semantics(&mut self) -> PipelineResult<TaggedSvg> {
        let hints = if self.burn_in_passes.is_empty() {
            None
        } else {
            Some(self.reconciler.reconcile(&self.burn_in_passes))
        };
        let final_pass = self.label_pass("tag", hints.as_ref())?;

        let mut passes = self.burn_in_passes.clone();
        passes.push(final_pass);
        let labeling = self.reconciler.reconcile(&passes);

        let binding = self.binding()?;
        let tagged = TaggedSvg::from_labeling(&binding.source, &labeling)?;
        let missing = tagged.missing_classes(&binding.plan);
        if !missing.is_empty() {
            return Err(PipelineError::TaggingGap { missing });
        }
        for (class, elements) in &tagged.classes {
            tracing::info!(class = %class, elements = ?elements, "tagged class");
        }
        tracing::debug!(
            strategy = self.reconciler.name(),
            passes = passes.len(),
            "tagging reconciled"
        );

        self.cache.append(&TaggedCacheEntry {
            key: binding.cache_key.clone(),
            svg_path: binding.source.path().to_path_buf(),
            tagged: tagged.clone(),
        })?;
        self.tagged = Some(tagged.clone());
        Ok(tagged)
    }

    /// Whole-image PNG rendering, base64, computed once.
    pub fn full_svg_base64(&self) -> PipelineResult<&str> {
        if self.full_png.get().is_none() {
            let binding = self.binding()?;
            let encoded = rasterize_base64(self.rasterizer, binding.source.text())?;
            let _ = self.full_png.set(encoded);
        }
        Ok(self.full_png.get().map(String::as_str).unwrap_or_default())
    }

    /// PNG of only the elements tagged `name`, base64.
    pub fn render_by_class(&self, name: &str) -> PipelineResult<String> {
        let tagged = self
            .tagged
            .as_ref()
            .ok_or_else(|| PipelineError::config("render_by_class called before tagging"))?;
        let keep = tagged
            .classes
            .get(name)
            .filter(|elements| !elements.is_empty())
            .ok_or_else(|| PipelineError::NotFound(name.to_string()))?;
        let binding = self.binding()?;
        let source = SvgSource::parse(binding.source.path().to_path_buf(), tagged.svg.clone())?;
        let hide = AttrEdit::Set("display".to_string(), "none".to_string());
        let edits: BTreeMap<usize, Vec<AttrEdit>> = source
            .elements()
            .iter()
            .filter(|element| !keep.contains(&element.index))
            .map(|element| (element.index, vec![hide.clone()]))
            .collect();
        let masked = source.rewrite(&edits)?;
        rasterize_base64(self.rasterizer, &masked)
    }

    pub fn tagged(&self) -> Option<&TaggedSvg> {
        self.tagged.as_ref()
    }

    pub fn burn_in_passes(&self) -> &[Labeling] {
        &self.burn_in_passes
    }

    fn label_pass(&self, purpose: &str, hints: Option<&Labeling>) -> PipelineResult<Labeling> {
        let binding = self.binding()?;
        let image = self.full_svg_base64()?.to_string();
        let plan_text = serde_json::to_string_pretty(&binding.plan)
            .map_err(|err| PipelineError::model(format!("serialize plan: {err}")))?;
        let hints_text = hints.map(render_hints).unwrap_or_default();
        let prompt = fill_template(
            TAG_PROMPT,
            &[
                ("plan", &plan_text),
                ("vocabulary", &binding.vocabulary.join(", ")),
                ("hints", &hints_text),
                ("inventory", &binding.source.inventory()),
            ],
        );
        let request = ModelRequest::new(purpose)
            .with_system(TAG_SYSTEM)
            .text(prompt)
            .image(image);
        let response = self.model.complete(&request)?;
        parse_labeling(
            &parse_json_response(&response)?,
            &binding.vocabulary,
            binding.source.elements().len(),
        )
    }
}

fn render_hints(consensus: &Labeling) -> String {
    let mut by_class: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (element, class) in consensus {
        by_class
            .entry(class.as_str())
            .or_default()
            .push(format!("#{element}"));
    }
    let mut text = String::from("## Earlier passes\n\nPrevious labeling passes suggested:\n");
    for (class, elements) in by_class {
        text.push_str(&format!("- {class}: {}\n", elements.join(", ")));
    }
    text
}

/// Parse `{"assignments": {class: [indices]}}` (or the bare inner object).
///
/// Unknown classes and out-of-range indices are dropped with a warning; an
/// element claimed by two classes keeps the first.
fn parse_labeling(
    value: &Value,
    vocabulary: &[String],
    element_count: usize,
) -> PipelineResult<Labeling> {
    let object = value
        .get("assignments")
        .unwrap_or(value)
        .as_object()
        .ok_or_else(|| PipelineError::model("labeling must be a JSON object"))?;

    let mut labeling = Labeling::new();
    for (class, indices) in object {
        let class = class.trim();
        if !vocabulary.iter().any(|known| known == class) {
            tracing::warn!(class, "labeling used a class outside the plan; ignored");
            continue;
        }
        let indices = indices.as_array().ok_or_else(|| {
            PipelineError::model(format!("labeling for {class:?} must be a list of indices"))
        })?;
        for raw in indices {
            let index = parse_index(raw).ok_or_else(|| {
                PipelineError::model(format!("labeling for {class:?} has a bad index: {raw}"))
            })?;
            if index >= element_count {
                tracing::warn!(class, index, "labeling index out of range; ignored");
                continue;
            }
            if let Some(existing) = labeling.get(&index) {
                tracing::warn!(index, kept = %existing, dropped = class, "element labeled twice");
                continue;
            }
            labeling.insert(index, class.to_string());
        }
    }
    Ok(labeling)
}

fn parse_index(raw: &Value) -> Option<usize> {
    match raw {
        Value::Number(number) => number.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(text) => text.trim().trim_start_matches('#').parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tagger_tests.rs"]
mod tests;
